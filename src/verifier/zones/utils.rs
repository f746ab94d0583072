use crate::shared::dns;
use crate::verifier::zones::errors::*;
use crate::verifier::zones::tokens::*;

/// Parse the TTL and [`dns::Class`] from one of the following formats: \[ttl] \[class]
/// or \[class] \[ttl], both optionals. It consumes only the tokens strictly needed,
/// leaving untouched the next ones (the record type).
pub fn parse_ttl_class(tokenizer: &mut Tokenizer) -> Result<(Option<u32>, Option<dns::Class>), ParseErr> {
    let next_token = tokenizer.peek_after_blanks()?;

    // Try the ttl [class] format.
    if let Token::Number(n) = next_token {
        tokenizer.next().unwrap(); // discard the peeked token
        let class_or_type = tokenizer.peek_after_blanks()?;
        return if let Ok(class) = try_to_class(&class_or_type) {
            tokenizer.next().unwrap();
            Ok((Some(n), Some(class)))
        } else {
            Ok((Some(n), None))
        };
    }

    // Try the class [ttl] format. We expect a string in any case since
    // even if we don't have the class we should find the record type.
    let class_or_type = match next_token {
        Token::String(s) => s,
        _ => return Err(ParseErr::UnexpectedToken(next_token)),
    };

    if let Ok(class) = dns::Class::from_string(&class_or_type) {
        tokenizer.next().unwrap();
        let ttl_or_type = tokenizer.peek_after_blanks()?;
        return if let Ok(ttl) = try_to_ttl(&ttl_or_type) {
            tokenizer.next().unwrap();
            Ok((Some(ttl), Some(class)))
        } else {
            Ok((None, Some(class)))
        };
    }

    // No class, no TTL.
    Ok((None, None))
}

fn try_to_ttl(token: &Token) -> Result<u32, ()> {
    if let Token::Number(n) = token {
        Ok(*n)
    } else {
        Err(())
    }
}

fn try_to_class(token: &Token) -> Result<dns::Class, ()> {
    if let Token::String(s) = token {
        return match dns::Class::from_string(s) {
            Err(_) => Err(()),
            Ok(v) => Ok(v),
        };
    }
    Err(())
}

/// Replace "@" with the current origin, or return the absolute form of
/// the passed name completing relative ones with the origin. The name
/// is also validated.
pub fn adjust_name(current_origin: &dns::Name, name: &mut String) -> Result<dns::Name, ParseErr> {
    if name == "@" {
        return Ok(current_origin.clone());
    }
    if !name.ends_with('.') {
        name.push('.');
        name.push_str(&current_origin.to_string());
        // A name relative to the root would end up with a double dot.
        if name.ends_with("..") {
            name.pop();
        }
    }
    match dns::Name::from_string(name) {
        Ok(name) => Ok(name),
        Err(err) => Err(err)?,
    }
}

/// Parse the passed token as a text chunk of a TXT record. Numbers are
/// accepted verbatim, since a bare "42" is valid record text.
pub fn parse_char_string(token: Token) -> Result<String, ParseErr> {
    match token {
        Token::String(s) => Ok(s),
        Token::QString(s) => Ok(s),
        Token::Number(n) => Ok(n.to_string()),
        _ => Err(ParseErr::UnexpectedToken(token)),
    }
}
