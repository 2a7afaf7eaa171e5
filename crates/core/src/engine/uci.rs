//! Parsing of UCI engine output

use super::analysis::Evaluation;

/// One `info` line carrying a search result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoLine {
    pub depth: u32,
    /// 1 unless the engine runs with MultiPV
    pub multipv: u32,
    /// Score relative to the side to move
    pub evaluation: Option<Evaluation>,
    pub nodes: u64,
    pub time_ms: u64,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
}

/// A line of engine output we care about
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    /// `bestmove e2e4 ponder e7e5`; `None` for `bestmove (none)`
    BestMove(Option<String>),
    Other,
}

/// Parses a single line from the engine
pub fn parse_line(line: &str) -> EngineMessage {
    let line = line.trim();
    let mut parts = line.split_whitespace();

    match parts.next() {
        Some("uciok") => EngineMessage::UciOk,
        Some("readyok") => EngineMessage::ReadyOk,
        Some("bestmove") => {
            let best = parts
                .next()
                .filter(|mv| *mv != "(none)" && *mv != "0000")
                .map(str::to_string);
            EngineMessage::BestMove(best)
        }
        Some("info") => match parse_info(line) {
            Some(info) => EngineMessage::Info(info),
            None => EngineMessage::Other,
        },
        _ => EngineMessage::Other,
    }
}

/// Parses an info line; returns `None` for lines without a score
fn parse_info(line: &str) -> Option<InfoLine> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.get(1) == Some(&"string") {
        return None;
    }

    let mut info = InfoLine {
        multipv: 1,
        ..InfoLine::default()
    };
    let mut i = 1;

    while i < parts.len() {
        match parts[i] {
            "depth" => {
                if let Some(value) = parts.get(i + 1) {
                    info.depth = value.parse().unwrap_or(0);
                }
                i += 2;
            }
            "multipv" => {
                if let Some(value) = parts.get(i + 1) {
                    info.multipv = value.parse().unwrap_or(1);
                }
                i += 2;
            }
            "score" => {
                if let (Some(kind), Some(value)) = (parts.get(i + 1), parts.get(i + 2)) {
                    match *kind {
                        "cp" => info.evaluation = value.parse().ok().map(Evaluation::Centipawns),
                        "mate" => info.evaluation = value.parse().ok().map(Evaluation::Mate),
                        _ => {}
                    }
                }
                i += 3;
            }
            "nodes" => {
                if let Some(value) = parts.get(i + 1) {
                    info.nodes = value.parse().unwrap_or(0);
                }
                i += 2;
            }
            "time" => {
                if let Some(value) = parts.get(i + 1) {
                    info.time_ms = value.parse().unwrap_or(0);
                }
                i += 2;
            }
            "pv" => {
                // Everything after "pv" is the principal variation
                info.pv = parts[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            _ => {
                i += 1;
            }
        }
    }

    info.evaluation.map(|_| info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_info_line() {
        let line = "info depth 18 seldepth 24 multipv 2 score cp -35 nodes 123456 nps 900000 time 137 pv e7e5 g1f3 b8c6";
        let EngineMessage::Info(info) = parse_line(line) else {
            panic!("expected info line");
        };

        assert_eq!(info.depth, 18);
        assert_eq!(info.multipv, 2);
        assert_eq!(info.evaluation, Some(Evaluation::Centipawns(-35)));
        assert_eq!(info.nodes, 123456);
        assert_eq!(info.time_ms, 137);
        assert_eq!(info.pv, vec!["e7e5", "g1f3", "b8c6"]);
    }

    #[test]
    fn test_parse_mate_with_bound() {
        let line = "info depth 30 score mate -4 upperbound nodes 10 pv h7h6";
        let EngineMessage::Info(info) = parse_line(line) else {
            panic!("expected info line");
        };
        assert_eq!(info.evaluation, Some(Evaluation::Mate(-4)));
        assert_eq!(info.multipv, 1);
        assert_eq!(info.nodes, 10);
    }

    #[test]
    fn test_lines_without_score_are_ignored() {
        assert_eq!(parse_line("info depth 5 currmove e2e4 currmovenumber 1"), EngineMessage::Other);
        assert_eq!(parse_line("info string NNUE evaluation using nn.nnue"), EngineMessage::Other);
        assert_eq!(parse_line("Stockfish 16 by the Stockfish developers"), EngineMessage::Other);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            EngineMessage::BestMove(Some("e2e4".to_string()))
        );
        assert_eq!(parse_line("bestmove (none)"), EngineMessage::BestMove(None));
        assert_eq!(parse_line("readyok"), EngineMessage::ReadyOk);
        assert_eq!(parse_line("uciok"), EngineMessage::UciOk);
    }
}
