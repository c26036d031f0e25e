// FILE: crates/cli/src/main.rs

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use storystream_config::{Config, ConfigManager};

mod commands;
mod manifest;
mod player;

fn book_id_arg() -> Arg {
    Arg::new("id")
        .required(true)
        .value_name("BOOK_ID")
        .help("Audiobook ID (UUID)")
}

fn build_cli() -> Command {
    Command::new("storystream")
        .version("0.1.0")
        .author("StoryStream Team")
        .about("Audiobook progress tracking and playback sessions")
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("PATH")
                .help("Path to the database file (defaults to the configured path)")
                .global(true),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("init").about("Create the database and write a default config if missing"),
        )
        .subcommand(
            Command::new("import")
                .about("Import an audiobook from a JSON manifest")
                .arg(
                    Arg::new("manifest")
                        .required(true)
                        .value_name("MANIFEST")
                        .help("Manifest listing source files and chapters"),
                ),
        )
        .subcommand(Command::new("list").about("List all audiobooks with their progress"))
        .subcommand(
            Command::new("info")
                .about("Show files, chapters and position of an audiobook")
                .arg(book_id_arg()),
        )
        .subcommand(
            Command::new("locate")
                .about("Show which file and chapter an absolute position falls in")
                .arg(book_id_arg())
                .arg(
                    Arg::new("position")
                        .required(true)
                        .value_name("POSITION")
                        .help("Milliseconds or H:MM:SS"),
                ),
        )
        .subcommand(
            Command::new("bookmarks")
                .about("List the bookmarks of an audiobook")
                .arg(book_id_arg()),
        )
        .subcommand(
            Command::new("bookmark-add")
                .about("Add a bookmark")
                .arg(book_id_arg())
                .arg(
                    Arg::new("position")
                        .required(true)
                        .value_name("POSITION")
                        .help("Milliseconds or H:MM:SS"),
                )
                .arg(
                    Arg::new("note")
                        .short('n')
                        .long("note")
                        .value_name("TEXT")
                        .help("Bookmark note (defaults to the current time)"),
                ),
        )
        .subcommand(
            Command::new("bookmark-delete")
                .about("Delete a bookmark")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_name("BOOKMARK_ID")
                        .help("Bookmark ID (UUID)"),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Run a simulated playback session and save progress")
                .arg(book_id_arg())
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_name("N")
                        .help("Stop after N seconds of wall time")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("POSITION")
                        .help("Jump here before playing (milliseconds or H:MM:SS)"),
                )
                .arg(
                    Arg::new("speed")
                        .long("speed")
                        .value_name("RATE")
                        .help("Playback speed (0.5 - 3.0)")
                        .value_parser(clap::value_parser!(f32)),
                )
                .arg(
                    Arg::new("time-scale")
                        .long("time-scale")
                        .value_name("FACTOR")
                        .help("Simulated audio milliseconds per wall-clock millisecond")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("1.0"),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete an audiobook and its bookmarks")
                .arg(book_id_arg())
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Skip confirmation prompt")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn config_manager(matches: &ArgMatches) -> Result<ConfigManager> {
    match matches.get_one::<String>("config-dir") {
        Some(dir) => ConfigManager::with_directory(PathBuf::from(dir)),
        None => ConfigManager::new(),
    }
    .context("Failed to locate config directory")
}

fn load_config(manager: &ConfigManager) -> Config {
    manager.load_with_env_overrides().unwrap_or_else(|e| {
        eprintln!("Config error: {}, using defaults", e);
        Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let manager = config_manager(&matches)?;
    let config = load_config(&manager);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.log_level.to_string()),
    )
    .init();

    let db_path = matches
        .get_one::<String>("database")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.app.database_path.clone());
    log::debug!("Using database {}", db_path.display());

    let pool = storystream_database::open(&db_path)
        .await
        .context("Failed to initialize database")?;

    match matches.subcommand() {
        Some(("init", _)) => commands::init(&manager, &db_path),
        Some(("import", sub_matches)) => commands::import_audiobook(&pool, sub_matches).await,
        Some(("list", _)) => commands::list_audiobooks(&pool).await,
        Some(("info", sub_matches)) => commands::show_audiobook_info(&pool, sub_matches).await,
        Some(("locate", sub_matches)) => commands::locate_position(&pool, sub_matches).await,
        Some(("bookmarks", sub_matches)) => commands::list_bookmarks(&pool, sub_matches).await,
        Some(("bookmark-add", sub_matches)) => commands::add_bookmark(&pool, sub_matches).await,
        Some(("bookmark-delete", sub_matches)) => {
            commands::delete_bookmark(&pool, sub_matches).await
        }
        Some(("play", sub_matches)) => {
            commands::play_audiobook(&pool, &config, sub_matches).await
        }
        Some(("delete", sub_matches)) => commands::delete_audiobook(&pool, sub_matches).await,
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    }
}
