//! Fixed-count splitting of normalized content into partitions
//!
//! Partition size is `ceil(len / n)`; partition `i` covers
//! `[i * size, i * size + size)`, truncated at the end of the content, so the
//! last partition may be shorter. Lengths are counted in chars, never bytes,
//! so a slice boundary cannot fall inside a UTF-8 sequence.
//!
//! Inputs that would hand some principal an empty partition are rejected
//! before any encryption happens.

use std::ops::Range;

use nfcs_core::{NfcsError, NfcsResult, MAX_PARTITIONS, MIN_PARTITIONS};

/// Reject partition counts outside 2..=5.
pub fn check_partition_count(n: usize) -> NfcsResult<()> {
    if !(MIN_PARTITIONS..=MAX_PARTITIONS).contains(&n) {
        return Err(NfcsError::validation(format!(
            "partition count must be between {MIN_PARTITIONS} and {MAX_PARTITIONS}, got {n}"
        )));
    }
    Ok(())
}

/// Char ranges of each partition for content of `len` chars.
pub fn plan_partitions(len: usize, n: usize) -> NfcsResult<Vec<Range<usize>>> {
    check_partition_count(n)?;
    if len < n {
        return Err(NfcsError::validation(format!(
            "content has {len} characters, fewer than the {n} partitions requested"
        )));
    }

    let size = len.div_ceil(n);
    // e.g. len=5, n=4: size 2 gives 2,2,1 and nothing left for the fourth
    if (n - 1) * size >= len {
        return Err(NfcsError::validation(format!(
            "content of {len} characters cannot be split into {n} non-empty partitions"
        )));
    }

    Ok((0..n)
        .map(|i| {
            let start = i * size;
            let end = (start + size).min(len);
            start..end
        })
        .collect())
}

/// Split `content` into exactly `n` contiguous, non-empty partitions.
pub fn split_into_partitions(content: &str, n: usize) -> NfcsResult<Vec<String>> {
    // Byte offset of every char, plus the end of the string
    let offsets: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let len = offsets.len() - 1;

    let parts = plan_partitions(len, n)?
        .into_iter()
        .map(|r| content[offsets[r.start]..offsets[r.end]].to_string())
        .collect();

    tracing::debug!(chars = len, partitions = n, "split content");
    Ok(parts)
}

/// Concatenate partitions that are already in index order.
pub fn reassemble<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::with_capacity(parts.iter().map(|p| p.as_ref().len()).sum());
    for p in parts {
        out.push_str(p.as_ref());
    }
    out
}
