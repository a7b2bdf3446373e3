//! Line and column lookup for rendering diagnostics.

/// Pre-computed line start offsets for O(log L) line/column lookup.
///
/// ```
/// use kiln_diagnostic::span_utils::LineOffsetTable;
///
/// let source = "const A = 1;\nconst B = 2;";
/// let table = LineOffsetTable::build(source);
/// assert_eq!(table.offset_to_line_col(source, 0), (1, 1));
/// assert_eq!(table.offset_to_line_col(source, 19), (2, 7));
/// ```
#[derive(Clone, Debug, Default)]
pub struct LineOffsetTable {
    offsets: Vec<u32>,
}

impl LineOffsetTable {
    pub fn build(source: &str) -> Self {
        let mut offsets = vec![0u32];
        offsets.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, byte)| byte == b'\n')
                .map(|(i, _)| u32::try_from(i + 1).unwrap_or(u32::MAX)),
        );
        LineOffsetTable { offsets }
    }

    /// 1-based line containing `offset`.
    pub fn line_from_offset(&self, offset: u32) -> u32 {
        let line_idx = match self.offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        u32::try_from(line_idx + 1).unwrap_or(u32::MAX)
    }

    /// 1-based `(line, column)`; the column counts characters.
    pub fn offset_to_line_col(&self, source: &str, offset: u32) -> (u32, u32) {
        let line = self.line_from_offset(offset);
        let line_start = self
            .offsets
            .get(line as usize - 1)
            .copied()
            .unwrap_or(0) as usize;
        let end = (offset as usize).min(source.len()).max(line_start);
        let column = source
            .get(line_start..end)
            .map_or(0, |text| text.chars().count());
        (line, u32::try_from(column + 1).unwrap_or(u32::MAX))
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }
}
