//! Timeline mapping between absolute book time and per-file local time
//!
//! An audiobook is one logical timeline laid over an ordered list of physical
//! files. Every function here is a pure function of the book's source files and
//! chapters; nothing reads or writes the playback cursor.
//!
//! File durations are rounded to whole milliseconds once (see
//! [`SourceFile::duration_ms`]) so that mapping in either direction agrees on
//! where each file starts.

use storystream_core::{Audiobook, Chapter, SourceFile};

/// A position expressed as a file and an offset into that file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPosition {
    pub file_index: usize,
    pub local_ms: u64,
}

/// Resolves an absolute position to the file that contains it
///
/// Negative positions clamp to the start of the first file. Positions past the
/// end resolve to the last file, clamped to that file's duration. A boundary
/// between two files belongs to the later file.
pub fn absolute_to_local(book: &Audiobook, absolute_ms: i64) -> LocalPosition {
    let target = absolute_ms.max(0) as u64;
    let mut before = 0u64;

    for file in &book.source_files {
        let end = before + file.duration_ms();
        if end > target {
            return LocalPosition {
                file_index: file.index,
                local_ms: target - before,
            };
        }
        before = end;
    }

    match book.source_files.last() {
        Some(last) => LocalPosition {
            file_index: last.index,
            local_ms: last.duration_ms(),
        },
        None => LocalPosition {
            file_index: 0,
            local_ms: 0,
        },
    }
}

/// Converts a file-local offset back to an absolute position
///
/// `file_index` past the last file counts every file's duration.
pub fn local_to_absolute(book: &Audiobook, file_index: usize, local_ms: u64) -> u64 {
    file_start_ms(book, file_index) + local_ms
}

/// Absolute position at which a file begins
pub fn file_start_ms(book: &Audiobook, file_index: usize) -> u64 {
    book.source_files
        .iter()
        .take(file_index)
        .map(SourceFile::duration_ms)
        .sum()
}

/// First chapter of `file_index` whose range contains `local_ms`
pub fn chapter_for_local(book: &Audiobook, file_index: usize, local_ms: u64) -> Option<&Chapter> {
    book.chapters_in_file(file_index)
        .find(|chapter| in_range(chapter, local_ms))
}

/// Returns true if `local_ms` lies in `[start_ms, end_ms)`
pub fn in_range(chapter: &Chapter, local_ms: u64) -> bool {
    chapter.contains(local_ms)
}

/// Chapter to show for a position that may fall in a gap between chapters
///
/// Prefers the containing chapter, then the last chapter of the file that has
/// already started, then the file's first chapter.
pub fn resolve_chapter(book: &Audiobook, file_index: usize, local_ms: u64) -> Option<&Chapter> {
    chapter_for_local(book, file_index, local_ms)
        .or_else(|| {
            book.chapters_in_file(file_index)
                .filter(|chapter| chapter.start_ms <= local_ms)
                .last()
        })
        .or_else(|| book.chapters_in_file(file_index).next())
}

/// Absolute position at which a chapter begins
pub fn chapter_start_ms(book: &Audiobook, chapter: &Chapter) -> u64 {
    local_to_absolute(book, chapter.parent_source_file_index, chapter.start_ms)
}
