use std::io::{BufRead, Seek, SeekFrom};

/// Reads from a long-lived file handle, applies the given reader function, and rewinds the
/// cursor so the next call observes the file's fresh contents.
///
/// The cursor is rewound even if `reader` fails, so a single bad read does not poison the
/// handle for later calls.
pub fn read_and_rewind<T, R>(
    file: &mut R,
    reader: impl FnOnce(&mut R) -> std::io::Result<T>,
) -> std::io::Result<T>
where
    R: BufRead + Seek,
{
    let result = reader(file);
    file.seek(SeekFrom::Start(0))?;
    result
}
