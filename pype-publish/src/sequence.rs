//! Frame-sequence assembly.
//!
//! Files are grouped by the last run of digits in their file name:
//! `shot.1001.exr`, `shot.1002.exr` form one [`Collection`] with head
//! `shot.`, tail `.exr`, padding 4. A number with a leading zero fixes the
//! padding to its width; unpadded numbers get padding 0. Groups with a single
//! member are returned as remainders.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub head: String,
    pub padding: usize,
    pub tail: String,
    pub indexes: BTreeSet<u64>,
}

impl Collection {
    pub fn new(head: impl Into<String>, padding: usize, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            padding,
            tail: tail.into(),
            indexes: BTreeSet::new(),
        }
    }

    pub fn format_index(&self, index: u64) -> String {
        format!(
            "{}{:0width$}{}",
            self.head,
            index,
            self.tail,
            width = self.padding
        )
    }

    /// Member paths in frame order.
    pub fn paths(&self) -> Vec<String> {
        self.indexes.iter().map(|i| self.format_index(*i)).collect()
    }
}

/// Position and width of the last digit run in the file-name part of `path`.
fn frame_span(path: &str) -> Option<(usize, usize)> {
    let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let bytes = path.as_bytes();
    let mut end = bytes.len();
    while end > name_start && !bytes[end - 1].is_ascii_digit() {
        end -= 1;
    }
    if end == name_start {
        return None;
    }
    let mut start = end;
    while start > name_start && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    Some((start, end))
}

/// Split `paths` into frame collections and single files.
pub fn assemble<S: AsRef<str>>(paths: &[S]) -> (Vec<Collection>, Vec<String>) {
    let mut groups: BTreeMap<(String, usize, String), Vec<(u64, String)>> = BTreeMap::new();
    let mut remainders = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let Some((start, end)) = frame_span(path) else {
            remainders.push(path.to_owned());
            continue;
        };
        let digits = &path[start..end];
        let Ok(index) = digits.parse::<u64>() else {
            remainders.push(path.to_owned());
            continue;
        };
        let padding = if digits.len() > 1 && digits.starts_with('0') {
            digits.len()
        } else {
            0
        };
        groups
            .entry((path[..start].to_owned(), padding, path[end..].to_owned()))
            .or_default()
            .push((index, path.to_owned()));
    }

    let mut collections = Vec::new();
    for ((head, padding, tail), members) in groups {
        if members.len() < 2 {
            remainders.extend(members.into_iter().map(|(_, p)| p));
            continue;
        }
        let mut collection = Collection::new(head, padding, tail);
        collection.indexes = members.into_iter().map(|(i, _)| i).collect();
        collections.push(collection);
    }
    remainders.sort();
    (collections, remainders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_padded_frames() {
        let files = [
            "/pub/v003/shot_v003.0998.exr",
            "/pub/v003/shot_v003.0999.exr",
            "/pub/v003/shot_v003.1000.exr",
        ];
        let (collections, remainders) = assemble(&files);
        assert!(remainders.is_empty());
        assert_eq!(collections.len(), 1);
        let col = &collections[0];
        assert_eq!(col.head, "/pub/v003/shot_v003.");
        assert_eq!(col.tail, ".exr");
        assert_eq!(col.padding, 4);
        assert_eq!(col.paths(), files.map(String::from).to_vec());
    }

    #[test]
    fn single_files_are_remainders() {
        let (collections, remainders) = assemble(&["/pub/model.abc", "/pub/model_v001.blend"]);
        assert!(collections.is_empty());
        assert_eq!(remainders, vec!["/pub/model.abc", "/pub/model_v001.blend"]);
    }

    #[test]
    fn directory_digits_are_ignored() {
        let (collections, remainders) = assemble(&["/v001/a.exr", "/v002/a.exr"]);
        assert!(collections.is_empty());
        assert_eq!(remainders.len(), 2);
    }

    #[test]
    fn destination_uses_its_own_padding() {
        let mut dst = Collection::new("/hero/shot_hero.", 6, ".exr");
        dst.indexes.extend([7, 8]);
        assert_eq!(
            dst.paths(),
            vec!["/hero/shot_hero.000007.exr", "/hero/shot_hero.000008.exr"]
        );
    }
}
