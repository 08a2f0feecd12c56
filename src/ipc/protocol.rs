//! Line protocol between clients and the daemon.
//!
//! One request line in, one response line out, then the connection closes.

use std::path::PathBuf;

/// Keyword a client sends to probe readiness.
pub const HEALTH_COMMAND: &str = "HEALTH";

/// Prefix of every failure reply.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Message for a blank request line.
pub const NO_AUDIO_PATH: &str = "No audio path provided";

/// A classified request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Readiness probe
    Health,
    /// Transcribe the file at this path
    Transcribe(PathBuf),
    /// Blank line (or EOF before any data)
    Empty,
}

impl Request {
    /// Classify one request line. Surrounding whitespace, including the
    /// terminator, is ignored.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Empty,
            HEALTH_COMMAND => Self::Health,
            path => Self::Transcribe(PathBuf::from(path)),
        }
    }

    /// Render as a newline-terminated request line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Health => format!("{}\n", HEALTH_COMMAND),
            Self::Transcribe(path) => format!("{}\n", path.display()),
            Self::Empty => "\n".to_string(),
        }
    }
}

/// Reply sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Engine is ready
    Ok,
    /// Socket is up but the engine is still loading
    Loading,
    /// Successful transcription
    Transcript(String),
    /// Failure, rendered as `ERROR: <message>`
    Error(String),
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Render as a single newline-terminated line.
    ///
    /// Embedded line breaks would end the reply early, so they become spaces.
    pub fn to_line(&self) -> String {
        let body = match self {
            Self::Ok => "OK".to_string(),
            Self::Loading => "LOADING".to_string(),
            Self::Transcript(text) => single_line(text),
            Self::Error(message) => format!("{} {}", ERROR_PREFIX, single_line(message)),
        };
        format!("{}\n", body)
    }

    /// Interpret a reply line received by a client.
    ///
    /// `OK` and `LOADING` are only meaningful for health probes; a transcript
    /// reading literally "OK" is reported as [`Response::Ok`].
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            return Self::Error(message.trim().to_string());
        }
        match line {
            "OK" => Self::Ok,
            "LOADING" => Self::Loading,
            text => Self::Transcript(text.to_string()),
        }
    }
}

fn single_line(text: &str) -> String {
    if text.contains(['\n', '\r']) {
        text.split(['\n', '\r'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_health() {
        assert_eq!(Request::parse("HEALTH\n"), Request::Health);
        assert_eq!(Request::parse("  HEALTH  "), Request::Health);
    }

    #[test]
    fn test_health_keyword_is_case_sensitive() {
        assert_eq!(
            Request::parse("health\n"),
            Request::Transcribe(PathBuf::from("health"))
        );
    }

    #[test]
    fn test_parse_empty_and_whitespace() {
        assert_eq!(Request::parse(""), Request::Empty);
        assert_eq!(Request::parse("\n"), Request::Empty);
        assert_eq!(Request::parse("   \r\n"), Request::Empty);
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            Request::parse("/tmp/a.wav\n"),
            Request::Transcribe(PathBuf::from("/tmp/a.wav"))
        );
    }

    #[test]
    fn test_parse_path_with_spaces_inside() {
        assert_eq!(
            Request::parse("/tmp/my recording.wav\n"),
            Request::Transcribe(PathBuf::from("/tmp/my recording.wav"))
        );
    }

    #[test]
    fn test_request_lines() {
        assert_eq!(Request::Health.to_line(), "HEALTH\n");
        assert_eq!(
            Request::Transcribe(PathBuf::from("/tmp/a.wav")).to_line(),
            "/tmp/a.wav\n"
        );
        assert_eq!(Request::Empty.to_line(), "\n");
    }

    #[test]
    fn test_response_lines() {
        assert_eq!(Response::Ok.to_line(), "OK\n");
        assert_eq!(Response::Loading.to_line(), "LOADING\n");
        assert_eq!(
            Response::Transcript("hello world".to_string()).to_line(),
            "hello world\n"
        );
        assert_eq!(
            Response::error("file not found").to_line(),
            "ERROR: file not found\n"
        );
        assert_eq!(
            Response::error(NO_AUDIO_PATH).to_line(),
            "ERROR: No audio path provided\n"
        );
    }

    #[test]
    fn test_multiline_transcript_is_flattened() {
        let response = Response::Transcript("first line\nsecond line\r\n".to_string());
        assert_eq!(response.to_line(), "first line second line\n");
    }

    #[test]
    fn test_empty_transcript_is_blank_line() {
        assert_eq!(Response::Transcript(String::new()).to_line(), "\n");
    }

    #[test]
    fn test_parse_response_lines() {
        assert_eq!(Response::parse("OK\n"), Response::Ok);
        assert_eq!(Response::parse("LOADING\n"), Response::Loading);
        assert_eq!(
            Response::parse("ERROR: file not found\n"),
            Response::Error("file not found".to_string())
        );
        assert_eq!(
            Response::parse("hello world\n"),
            Response::Transcript("hello world".to_string())
        );
    }
}
