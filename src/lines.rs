//! Zero-copy splitting of a region into lines.

use memchr::memchr;

/// Iterator over the lines of a region, without their `\n` terminators.
///
/// Every `\n` ends a line, so an empty line between two newlines is yielded
/// as an empty slice. Bytes after the last newline are yielded as a final
/// line when non-empty.
pub struct Lines<'a> {
    rest: &'a [u8],
}

impl<'a> Lines<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self { rest: region }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        match memchr(b'\n', self.rest) {
            Some(end) => {
                let line = &self.rest[..end];
                self.rest = &self.rest[end + 1..];
                Some(line)
            }
            None => Some(std::mem::take(&mut self.rest)),
        }
    }
}

/// Calls `f` with every line of `region`.
#[inline]
pub fn for_each_line<'a>(region: &'a [u8], f: impl FnMut(&'a [u8])) {
    Lines::new(region).for_each(f)
}
