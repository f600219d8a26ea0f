use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Movie {
    /// Document id; empty until the movie is first saved
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub genre: String,
    pub year: i32,
}

impl Movie {
    pub fn new(title: impl Into<String>, genre: impl Into<String>, year: i32) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            genre: genre.into(),
            year,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns true once the movie has been assigned a document id.
    pub fn is_saved(&self) -> bool {
        !self.id.is_empty()
    }
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.title, self.year)?;
        writeln!(f, "{}", "=".repeat(self.title.len() + 7))?;
        writeln!(f, "Genre: {}", self.genre)?;
        if self.is_saved() {
            write!(f, "ID: {}", self.id)?;
        } else {
            write!(f, "ID: (unsaved)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_movie_has_no_id() {
        let movie = Movie::new("Dune", "Sci-Fi", 2021);
        assert_eq!(movie.title, "Dune");
        assert_eq!(movie.genre, "Sci-Fi");
        assert_eq!(movie.year, 2021);
        assert!(movie.id.is_empty());
        assert!(!movie.is_saved());
    }

    #[test]
    fn test_deserialize_without_id() {
        let json = r#"{"title": "Alien", "genre": "Horror", "year": 1979}"#;
        let movie: Movie = serde_json::from_str(json).unwrap();
        assert_eq!(movie.title, "Alien");
        assert!(movie.id.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let movie = Movie::new("Heat", "Crime", 1995).with_id("abc");
        let value = serde_json::to_value(&movie).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["title"], "Heat");
        assert_eq!(value["genre"], "Crime");
        assert_eq!(value["year"], 1995);
    }

    #[test]
    fn test_display() {
        let movie = Movie::new("Heat", "Crime", 1995).with_id("abc");
        let output = movie.to_string();
        assert!(output.contains("Heat (1995)"));
        assert!(output.contains("Genre: Crime"));
        assert!(output.contains("ID: abc"));
    }
}
