use crate::shared::dns;
use crate::verifier::zones::tokens::*;
use std::io;

/// The [ParseErr] with a string describing the context of the error.
pub type ParseErrCtx = (ParseErr, String);

/// Errors returned during the zone files parsing process. Only
/// [ParseErr::ReadingErr] aborts a whole file; every other variant is
/// confined to the zone file line that produced it.
#[derive(Debug)]
pub enum ParseErr {
    // Errors from the tokenizer.
    UnexpectedToken(Token),
    MalformedToken(TokenErr),
    ReadingErr(io::Error),

    // Wrong data in zone file.
    MalformedData(String),
    UnknownType(String),
    UnexpectedRecord(String),
}

impl From<TokenErr> for ParseErr {
    fn from(err: TokenErr) -> Self {
        match err {
            TokenErr::ReadErr(err) => ParseErr::ReadingErr(err),
            _ => ParseErr::MalformedToken(err),
        }
    }
}

impl From<dns::NameErr> for ParseErr {
    fn from(err: dns::NameErr) -> Self {
        ParseErr::MalformedData(format!("invalid name, {:?}", err))
    }
}

impl ParseErr {
    /// Reports if the error compromises the whole file, as opposed to
    /// the single line it was found on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseErr::ReadingErr(_))
    }
}
