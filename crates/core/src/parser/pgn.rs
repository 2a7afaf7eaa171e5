//! PGN file parsing functionality
//!
//! Moves are collected as SAN tokens without checking legality; replaying
//! them against the rules is left to [`crate::history::History::build`], which
//! tolerates a bad trailing token instead of rejecting the whole game.

use pgn_reader::{RawComment, RawTag, SanPlus, Skip, Visitor};
use std::fs;
use std::io::{self, Cursor};
use std::ops::ControlFlow;
use std::path::Path;

/// Represents a parsed chess game
#[derive(Debug, Clone, Default)]
pub struct PgnGame {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub white_elo: Option<u16>,
    pub black_elo: Option<u16>,
    /// Moves in SAN notation, as written in the file
    pub moves: Vec<String>,
    /// `[%clk]` annotation following each move, same length as `moves`
    pub clocks: Vec<Option<String>>,
}

impl PgnGame {
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn summary(&self) -> String {
        let white = self.white.as_deref().unwrap_or("Unknown");
        let black = self.black.as_deref().unwrap_or("Unknown");
        let result = self.result.as_deref().unwrap_or("*");
        format!("{} vs {} - {}", white, black, result)
    }
}

#[derive(Default)]
struct GameTags {
    event: Option<String>,
    site: Option<String>,
    date: Option<String>,
    white: Option<String>,
    black: Option<String>,
    result: Option<String>,
    white_elo: Option<u16>,
    black_elo: Option<u16>,
}

struct GameMoves {
    tags: GameTags,
    moves: Vec<String>,
    clocks: Vec<Option<String>>,
}

struct GameParser;

impl Visitor for GameParser {
    type Tags = GameTags;
    type Movetext = GameMoves;
    type Output = PgnGame;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let name_str = String::from_utf8_lossy(name);
        let value_str = value.decode_utf8_lossy().to_string();

        match name_str.as_ref() {
            "Event" => tags.event = Some(value_str),
            "Site" => tags.site = Some(value_str),
            "Date" => tags.date = Some(value_str),
            "White" => tags.white = Some(value_str),
            "Black" => tags.black = Some(value_str),
            "Result" => tags.result = Some(value_str),
            "WhiteElo" => tags.white_elo = value_str.parse().ok(),
            "BlackElo" => tags.black_elo = value_str.parse().ok(),
            _ => {}
        }

        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(GameMoves {
            tags,
            moves: Vec::new(),
            clocks: Vec::new(),
        })
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        movetext.moves.push(san.to_string());
        movetext.clocks.push(None);
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let text = String::from_utf8_lossy(comment.as_bytes());
        if let (Some(clock), Some(slot)) = (parse_clock(&text), movetext.clocks.last_mut()) {
            *slot = Some(clock);
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(
        &mut self,
        _movetext: &mut Self::Movetext,
    ) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        PgnGame {
            event: movetext.tags.event,
            site: movetext.tags.site,
            date: movetext.tags.date,
            white: movetext.tags.white,
            black: movetext.tags.black,
            result: movetext.tags.result,
            white_elo: movetext.tags.white_elo,
            black_elo: movetext.tags.black_elo,
            moves: movetext.moves,
            clocks: movetext.clocks,
        }
    }
}

/// Extracts the clock from a `[%clk 0:03:00]` comment annotation
pub fn parse_clock(comment: &str) -> Option<String> {
    let start = comment.find("[%clk")? + "[%clk".len();
    let rest = &comment[start..];
    let end = rest.find(']')?;
    let clock = rest[..end].trim();
    (!clock.is_empty()).then(|| clock.to_string())
}

#[derive(Debug)]
pub enum PgnError {
    FileError(io::Error),
    NoGamesFound,
    ParseError(String),
}

impl std::fmt::Display for PgnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgnError::FileError(e) => write!(f, "File error: {}", e),
            PgnError::NoGamesFound => write!(f, "No valid games found in PGN"),
            PgnError::ParseError(s) => write!(f, "Parse error: {}", s),
        }
    }
}

impl std::error::Error for PgnError {}

impl From<io::Error> for PgnError {
    fn from(error: io::Error) -> Self {
        PgnError::FileError(error)
    }
}

pub fn parse_pgn_file<P: AsRef<Path>>(path: P) -> Result<Vec<PgnGame>, PgnError> {
    let contents = fs::read_to_string(path)?;
    parse_pgn_string(&contents)
}

pub fn parse_pgn_string(pgn: &str) -> Result<Vec<PgnGame>, PgnError> {
    let mut parser = GameParser;
    let mut games: Vec<PgnGame> = Vec::new();

    let cursor = Cursor::new(pgn.as_bytes());
    let mut reader = pgn_reader::Reader::new(cursor);

    loop {
        match reader.read_game(&mut parser) {
            Ok(Some(game)) => games.push(game),
            Ok(None) => break,
            Err(e) => return Err(PgnError::ParseError(e.to_string())),
        }
    }

    if games.is_empty() {
        Err(PgnError::NoGamesFound)
    } else {
        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PGN: &str = r#"[Event "Test"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 1-0
"#;

    const CLOCK_PGN: &str = r#"[Event "Rated Blitz game"]
[White "Alice"]
[Black "Bob"]
[WhiteElo "1820"]
[BlackElo "1795"]
[Result "0-1"]

1. d4 { [%clk 0:03:00] } 1... d5 { [%clk 0:02:58] } 2. c4 (2. Nf3 Nf6) 2... e6 { [%eval 0.2] [%clk 0:02:55] } 0-1
"#;

    #[test]
    fn test_parse_pgn_string() {
        let games = parse_pgn_string(SAMPLE_PGN).unwrap();
        assert_eq!(games.len(), 1);

        let game = &games[0];
        assert_eq!(game.white.as_deref(), Some("Alice"));
        assert_eq!(game.black.as_deref(), Some("Bob"));
        assert_eq!(game.result.as_deref(), Some("1-0"));
        assert_eq!(game.move_count(), 5);
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5"]);
    }

    #[test]
    fn test_game_summary() {
        let games = parse_pgn_string(SAMPLE_PGN).unwrap();
        let summary = games[0].summary();
        assert_eq!(summary, "Alice vs Bob - 1-0");
    }

    #[test]
    fn test_clocks_and_variations() {
        let games = parse_pgn_string(CLOCK_PGN).unwrap();
        let game = &games[0];

        // The 2. Nf3 side line is skipped
        assert_eq!(game.moves, vec!["d4", "d5", "c4", "e6"]);
        assert_eq!(game.white_elo, Some(1820));
        assert_eq!(
            game.clocks,
            vec![
                Some("0:03:00".to_string()),
                Some("0:02:58".to_string()),
                None,
                Some("0:02:55".to_string()),
            ]
        );
    }

    #[test]
    fn test_illegal_moves_are_kept_as_tokens() {
        let games = parse_pgn_string("1. e4 e5 2. Ke3 Nc6 *\n").unwrap();
        assert_eq!(games[0].moves, vec!["e4", "e5", "Ke3", "Nc6"]);
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock(" [%clk 1:02:03] "), Some("1:02:03".to_string()));
        assert_eq!(parse_clock("[%eval -0.5]"), None);
        assert_eq!(parse_clock("[%clk ]"), None);
    }
}
