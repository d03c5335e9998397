//! Canonical book table (Protestant canon, 66 books)

use serde::{Deserialize, Serialize};

/// Testament a book belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Testament {
    #[serde(rename = "OT", alias = "ot")]
    Old,
    #[serde(rename = "NT", alias = "nt")]
    New,
}

impl Testament {
    pub fn as_str(&self) -> &'static str {
        match self {
            Testament::Old => "OT",
            Testament::New => "NT",
        }
    }

    /// Book numbers belonging to this testament, in canonical order
    pub fn books(self) -> impl Iterator<Item = u8> {
        BOOKS
            .iter()
            .filter(move |b| b.testament == self)
            .map(|b| b.num)
    }
}

impl std::fmt::Display for Testament {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Testament {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OT" | "OLD" => Ok(Testament::Old),
            "NT" | "NEW" => Ok(Testament::New),
            _ => Err(format!("Unknown testament: {}", s)),
        }
    }
}

/// Static metadata for one canonical book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Book {
    pub num: u8,
    pub name: &'static str,
    pub abbrev: &'static str,
    pub testament: Testament,
}

/// Number of books in the canon
pub const BOOK_COUNT: u8 = 66;

macro_rules! book {
    ($num:expr, $name:expr, $abbrev:expr, $t:ident) => {
        Book {
            num: $num,
            name: $name,
            abbrev: $abbrev,
            testament: Testament::$t,
        }
    };
}

pub static BOOKS: [Book; BOOK_COUNT as usize] = [
    book!(1, "Genesis", "Gen", Old),
    book!(2, "Exodus", "Exod", Old),
    book!(3, "Leviticus", "Lev", Old),
    book!(4, "Numbers", "Num", Old),
    book!(5, "Deuteronomy", "Deut", Old),
    book!(6, "Joshua", "Josh", Old),
    book!(7, "Judges", "Judg", Old),
    book!(8, "Ruth", "Ruth", Old),
    book!(9, "1 Samuel", "1Sam", Old),
    book!(10, "2 Samuel", "2Sam", Old),
    book!(11, "1 Kings", "1Kgs", Old),
    book!(12, "2 Kings", "2Kgs", Old),
    book!(13, "1 Chronicles", "1Chr", Old),
    book!(14, "2 Chronicles", "2Chr", Old),
    book!(15, "Ezra", "Ezra", Old),
    book!(16, "Nehemiah", "Neh", Old),
    book!(17, "Esther", "Esth", Old),
    book!(18, "Job", "Job", Old),
    book!(19, "Psalms", "Ps", Old),
    book!(20, "Proverbs", "Prov", Old),
    book!(21, "Ecclesiastes", "Eccl", Old),
    book!(22, "Song of Solomon", "Song", Old),
    book!(23, "Isaiah", "Isa", Old),
    book!(24, "Jeremiah", "Jer", Old),
    book!(25, "Lamentations", "Lam", Old),
    book!(26, "Ezekiel", "Ezek", Old),
    book!(27, "Daniel", "Dan", Old),
    book!(28, "Hosea", "Hos", Old),
    book!(29, "Joel", "Joel", Old),
    book!(30, "Amos", "Amos", Old),
    book!(31, "Obadiah", "Obad", Old),
    book!(32, "Jonah", "Jonah", Old),
    book!(33, "Micah", "Mic", Old),
    book!(34, "Nahum", "Nah", Old),
    book!(35, "Habakkuk", "Hab", Old),
    book!(36, "Zephaniah", "Zeph", Old),
    book!(37, "Haggai", "Hag", Old),
    book!(38, "Zechariah", "Zech", Old),
    book!(39, "Malachi", "Mal", Old),
    book!(40, "Matthew", "Matt", New),
    book!(41, "Mark", "Mark", New),
    book!(42, "Luke", "Luke", New),
    book!(43, "John", "John", New),
    book!(44, "Acts", "Acts", New),
    book!(45, "Romans", "Rom", New),
    book!(46, "1 Corinthians", "1Cor", New),
    book!(47, "2 Corinthians", "2Cor", New),
    book!(48, "Galatians", "Gal", New),
    book!(49, "Ephesians", "Eph", New),
    book!(50, "Philippians", "Phil", New),
    book!(51, "Colossians", "Col", New),
    book!(52, "1 Thessalonians", "1Thess", New),
    book!(53, "2 Thessalonians", "2Thess", New),
    book!(54, "1 Timothy", "1Tim", New),
    book!(55, "2 Timothy", "2Tim", New),
    book!(56, "Titus", "Titus", New),
    book!(57, "Philemon", "Phlm", New),
    book!(58, "Hebrews", "Heb", New),
    book!(59, "James", "Jas", New),
    book!(60, "1 Peter", "1Pet", New),
    book!(61, "2 Peter", "2Pet", New),
    book!(62, "1 John", "1John", New),
    book!(63, "2 John", "2John", New),
    book!(64, "3 John", "3John", New),
    book!(65, "Jude", "Jude", New),
    book!(66, "Revelation", "Rev", New),
];

/// Look up a book by its canonical number (1-based)
pub fn book(num: u8) -> Option<&'static Book> {
    if num == 0 || num > BOOK_COUNT {
        return None;
    }
    Some(&BOOKS[(num - 1) as usize])
}

/// Resolve a book by full name or abbreviation, case-insensitively
pub fn find_book(name: &str) -> Option<&'static Book> {
    let needle = name.trim();
    BOOKS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(needle) || b.abbrev.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_dense() {
        for (i, b) in BOOKS.iter().enumerate() {
            assert_eq!(b.num as usize, i + 1);
        }
    }

    #[test]
    fn test_testament_split() {
        assert_eq!(Testament::Old.books().count(), 39);
        assert_eq!(Testament::New.books().count(), 27);
        assert_eq!(book(40).unwrap().testament, Testament::New);
        assert!(book(0).is_none());
        assert!(book(67).is_none());
    }

    #[test]
    fn test_find_book() {
        assert_eq!(find_book("john").unwrap().num, 43);
        assert_eq!(find_book("1Cor").unwrap().num, 46);
        assert!(find_book("Enoch").is_none());
    }

    #[test]
    fn test_testament_serde() {
        let t: Testament = serde_json::from_str("\"NT\"").unwrap();
        assert_eq!(t, Testament::New);
        assert_eq!(serde_json::to_string(&Testament::Old).unwrap(), "\"OT\"");
    }
}
