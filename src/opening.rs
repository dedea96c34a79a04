//! Opening table and per-user favorites.
//!
//! The table is read once at startup from a CSV file whose second column
//! holds the opening name and whose fourth column holds the UCI moves,
//! separated by single spaces:
//!
//! ```text
//! eco,name,pgn,uci
//! C55,Italian Game: Deutz Gambit,1. e4 e5 2. Nf3 Nc6 ...,e2e4 e7e5 g1f3 ...
//! ```

use log::debug;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

use crate::BoxError;

const NAME_COLUMN: usize = 1;
const MOVES_COLUMN: usize = 3;

/// Known openings plus the last opening each user asked for.
#[derive(Debug, Default)]
pub struct OpeningBook {
    openings: HashMap<String, String>,
    favorites: RwLock<HashMap<String, Vec<String>>>,
}

impl OpeningBook {
    /// Load the opening table from a CSV file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| format!("Cannot open opening table {}: {}", path.display(), e))?;
        Self::from_reader(file)
    }

    /// Load the opening table from any CSV source. The first row is a header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BoxError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut openings = HashMap::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            let (name, moves) = match (record.get(NAME_COLUMN), record.get(MOVES_COLUMN)) {
                (Some(name), Some(moves)) => (name, moves),
                // +2: one for the header, one for 1-based numbering
                _ => return Err(format!("Opening table row {} has too few columns", row + 2).into()),
            };
            openings.insert(name.to_string(), moves.to_string());
        }

        debug!("Loaded {} openings", openings.len());
        Ok(Self {
            openings,
            favorites: RwLock::new(HashMap::new()),
        })
    }

    /// Moves of the opening with exactly this name, or an empty list.
    pub fn lookup(&self, name: &str) -> Vec<String> {
        self.openings
            .get(name)
            .map(|moves| moves.split(' ').map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn set_favorite(&self, user: &str, moves: Vec<String>) {
        let mut favorites = self.favorites.write().unwrap_or_else(|e| e.into_inner());
        favorites.insert(user.to_string(), moves);
    }

    /// The opening `user` picked last, if they ever picked one.
    pub fn favorite(&self, user: &str) -> Option<Vec<String>> {
        let favorites = self.favorites.read().unwrap_or_else(|e| e.into_inner());
        favorites.get(user).cloned()
    }

    pub fn len(&self) -> usize {
        self.openings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "eco,name,pgn,uci
C55,Italian Game: Deutz Gambit,1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. O-O Nf6 5. d4,e2e4 e7e5 g1f3 b8c6 f1c4 f8c5 e1g1 g8f6 d2d4
B27,Sicilian Defense: Hyperaccelerated Dragon,1. e4 c5 2. Nf3 g6,e2e4 c7c5 g1f3 g7g6
D31,\"Queen's Gambit Declined: Alapin Variation, Main Line\",1. d4 d5 2. c4 e6 3. Nc3 b6,d2d4 d7d5 c2c4 e7e6 b1c3 b7b6
B27,Sicilian Defense: Hyperaccelerated Dragon,1. e4 c5 2. Nf3 g6 3. d4,e2e4 c7c5 g1f3 g7g6 d2d4
";

    fn book() -> OpeningBook {
        OpeningBook::from_reader(TABLE.as_bytes()).unwrap()
    }

    #[test]
    fn test_lookup_preserves_order() {
        let moves = book().lookup("Italian Game: Deutz Gambit");
        assert_eq!(
            moves,
            vec!["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "f8c5", "e1g1", "g8f6", "d2d4"]
        );
    }

    #[test]
    fn test_lookup_missing_is_empty() {
        assert!(book().lookup("Not A Real Opening").is_empty());
        // exact match only
        assert!(book().lookup("italian game: deutz gambit").is_empty());
    }

    #[test]
    fn test_quoted_name_with_comma() {
        let moves = book().lookup("Queen's Gambit Declined: Alapin Variation, Main Line");
        assert_eq!(moves.len(), 6);
        assert_eq!(moves[5], "b7b6");
    }

    #[test]
    fn test_duplicate_rows_overwrite() {
        let book = book();
        assert_eq!(book.len(), 3);
        assert_eq!(
            book.lookup("Sicilian Defense: Hyperaccelerated Dragon").last().map(String::as_str),
            Some("d2d4")
        );
    }

    #[test]
    fn test_short_row_is_an_error() {
        let table = "eco,name,pgn,uci\nC55,Italian Game\n";
        assert!(OpeningBook::from_reader(table.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(OpeningBook::load("/nonexistent/openings.csv").is_err());
    }

    #[test]
    fn test_shipped_table_loads() {
        let book = OpeningBook::load(concat!(env!("CARGO_MANIFEST_DIR"), "/openings.csv")).unwrap();
        assert!(!book.is_empty());
        assert_eq!(&book.lookup("Italian Game: Deutz Gambit")[..3], ["e2e4", "e7e5", "g1f3"]);
        assert!(!book.lookup("Sicilian Defense: Hyperaccelerated Dragon").is_empty());
    }

    #[test]
    fn test_favorite_round_trip() {
        let book = book();
        assert_eq!(book.favorite("alice"), None);

        book.set_favorite("alice", vec!["e2e4".to_string()]);
        assert_eq!(book.favorite("alice"), Some(vec!["e2e4".to_string()]));

        book.set_favorite("alice", Vec::new());
        assert_eq!(book.favorite("alice"), Some(Vec::new()));
        assert_eq!(book.favorite("bob"), None);
    }
}
