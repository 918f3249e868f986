//! Line-oriented helpers for the ordered-list autonumber walk.
//!
//! An ordered list item line starts with one or more ASCII digits followed
//! by `". "`. The walk never crosses a line that breaks the pattern.

/// Parses the item prefix of `line`: the numeric value and the prefix length
/// in bytes (digits plus `". "`).
pub(crate) fn item_prefix(line: &[u8]) -> Option<(u64, usize)> {
    let digits = line.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || !line[digits..].starts_with(b". ") {
        return None;
    }
    let num = std::str::from_utf8(&line[..digits])
        .ok()?
        .parse::<u64>()
        .ok()?;
    Some((num, digits + 2))
}

/// Number of the ordered item on the line immediately before `pos`, or 0
/// when that line is not an item (or there is no previous line). For a
/// mid-line `pos` the preceding line is the current line truncated at `pos`,
/// since the new item starts a fresh line there.
pub(crate) fn prev_item_number(flat: &[u8], pos: usize) -> u64 {
    if pos == 0 {
        return 0;
    }
    let line_end = if flat[pos - 1] == b'\n' { pos - 1 } else { pos };
    let line_start = flat[..line_end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    item_prefix(&flat[line_start..line_end])
        .map(|(num, _)| num)
        .unwrap_or(0)
}

/// Byte length of the consecutive run of item lines beginning exactly at
/// `start` (newline separators included; zero when the first line is not an
/// item).
pub(crate) fn item_run_len(flat: &[u8], start: usize) -> usize {
    let mut at = start;
    let mut end = start;
    while at < flat.len() {
        let nl = flat[at..].iter().position(|&b| b == b'\n').map(|i| at + i);
        let line = &flat[at..nl.unwrap_or(flat.len())];
        if item_prefix(line).is_none() {
            break;
        }
        at = nl.map(|i| i + 1).unwrap_or(flat.len());
        end = at;
    }
    end - start
}

/// Rewrites an item run so its numbers continue the sequence from `first`,
/// preserving everything after each prefix.
pub(crate) fn renumber_run(run: &[u8], first: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(run.len());
    let mut num = first;
    let mut at = 0;
    while at < run.len() {
        let nl = run[at..].iter().position(|&b| b == b'\n').map(|i| at + i);
        let line = &run[at..nl.unwrap_or(run.len())];
        let (_, prefix_len) = item_prefix(line).expect("run lines are ordered items");
        out.extend_from_slice(num.to_string().as_bytes());
        out.extend_from_slice(b". ");
        out.extend_from_slice(&line[prefix_len..]);
        if nl.is_some() {
            out.push(b'\n');
        }
        num += 1;
        at = nl.map(|i| i + 1).unwrap_or(run.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_prefix_accepts_multi_digit_numbers() {
        assert_eq!(item_prefix(b"12. item"), Some((12, 4)));
        assert_eq!(item_prefix(b"1. "), Some((1, 3)));
    }

    #[test]
    fn item_prefix_rejects_non_items() {
        assert_eq!(item_prefix(b"- bullet"), None);
        assert_eq!(item_prefix(b"1.missing space"), None);
        assert_eq!(item_prefix(b". 2"), None);
        assert_eq!(item_prefix(b""), None);
    }

    #[test]
    fn prev_item_number_reads_preceding_line() {
        assert_eq!(prev_item_number(b"1. a\n", 5), 1);
        assert_eq!(prev_item_number(b"text\n", 5), 0);
        assert_eq!(prev_item_number(b"", 0), 0);
        // Mid-line: the truncated current line is the preceding line.
        assert_eq!(prev_item_number(b"2. ab", 5), 2);
    }

    #[test]
    fn item_run_stops_at_first_non_item() {
        assert_eq!(item_run_len(b"1. a\n2. b\ntext", 0), 10);
        assert_eq!(item_run_len(b"1. a\n2. b", 0), 9);
        assert_eq!(item_run_len(b"text\n1. a", 0), 0);
    }

    #[test]
    fn renumber_preserves_content_after_prefix() {
        assert_eq!(renumber_run(b"1. a\n7. b", 2), b"2. a\n3. b");
        assert_eq!(renumber_run(b"9. x\n", 4), b"4. x\n");
    }
}
