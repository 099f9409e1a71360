//! Assertion-string parser.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr   := term   ((',' | '||') term)*
//! term   := factor (('+' | '&&') factor)*
//! factor := '(' expr ')' | url
//! url    := value '@' service | service ':' ['//'] value | username
//! ```

use vetted_types::IdentityId;

use crate::{AssertionError, AssertionExpression, AssertionUrl, FactorKind};

/// Length of a full PGP fingerprint in hex.
const PGP_FINGERPRINT_HEX_LEN: usize = 40;
/// Shortest fingerprint suffix accepted (2 bytes).
const MIN_FINGERPRINT_HEX_LEN: usize = 4;
const MAX_USERNAME_LEN: usize = 16;
const MAX_SOCIAL_NAME_LEN: usize = 64;
/// Deepest parenthesis nesting accepted.
const MAX_NESTING: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token<'a> {
    LParen,
    RParen,
    And,
    Or,
    Url(&'a str),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '+' | ',' | '&' | '|')
}

fn tokenize(s: &str) -> Result<Vec<(Token<'_>, usize)>, AssertionError> {
    let mut tokens = Vec::new();
    let mut chars = s.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::And,
            ',' => Token::Or,
            '&' | '|' => {
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    return Err(AssertionError::Syntax {
                        offset,
                        reason: format!("expected '{c}{c}'"),
                    });
                }
                if c == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            _ => {
                let mut end = offset + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if is_delimiter(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                Token::Url(&s[offset..end])
            }
        };
        tokens.push((token, offset));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<(Token<'a>, usize)>,
    pos: usize,
    len: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.len)
    }

    fn syntax(&self, reason: impl Into<String>) -> AssertionError {
        AssertionError::Syntax {
            offset: self.offset(),
            reason: reason.into(),
        }
    }

    fn expr(&mut self) -> Result<AssertionExpression, AssertionError> {
        let mut terms = vec![self.term()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.term()?);
        }
        Ok(collapse(terms, AssertionExpression::Or))
    }

    fn term(&mut self) -> Result<AssertionExpression, AssertionError> {
        let mut factors = vec![self.factor()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            factors.push(self.factor()?);
        }
        Ok(collapse(factors, AssertionExpression::And))
    }

    fn factor(&mut self) -> Result<AssertionExpression, AssertionError> {
        match self.peek() {
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    return Err(self.syntax("nesting too deep"));
                }
                self.depth += 1;
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.syntax("unbalanced parentheses"));
                }
                self.pos += 1;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Url(s)) => {
                let url = parse_url(s)?;
                self.pos += 1;
                Ok(AssertionExpression::Url(url))
            }
            Some(token) => Err(self.syntax(format!("unexpected {token:?}"))),
            None => Err(self.syntax("unexpected end of input")),
        }
    }
}

fn collapse(
    mut items: Vec<AssertionExpression>,
    wrap: fn(Vec<AssertionExpression>) -> AssertionExpression,
) -> AssertionExpression {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

/// Parse a full assertion expression.
pub fn parse(s: &str) -> Result<AssertionExpression, AssertionError> {
    let tokens = tokenize(s)?;
    if tokens.is_empty() {
        return Err(AssertionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: s.len(),
        depth: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.syntax("trailing input"));
    }
    Ok(expr)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

fn is_valid_service(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic() || c == '.')
}

/// Split a single factor into `(service, value)`. A bare name has no service.
fn split_factor(s: &str) -> Result<(Option<&str>, &str), AssertionError> {
    if let Some((name, service)) = s.rsplit_once('@') {
        if is_valid_service(service) && (name.is_empty() || is_valid_name(name)) {
            return Ok((Some(service), name));
        }
    }
    if let Some((service, name)) = s.split_once(':') {
        let name = name.strip_prefix("//").unwrap_or(name);
        if is_valid_service(service) && (name.is_empty() || is_valid_name(name)) {
            return Ok((Some(service), name));
        }
    }
    if is_valid_name(s) {
        return Ok((None, s));
    }
    Err(AssertionError::InvalidFactor(s.to_string()))
}

fn bad_value(service: &str, value: &str, reason: &str) -> AssertionError {
    AssertionError::BadValue {
        service: service.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_username(value: &str) -> Result<(), AssertionError> {
    let ok = (2..=MAX_USERNAME_LEN).contains(&value.len())
        && !value.starts_with('_')
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(bad_value("keybase", value, "not a valid username"))
    }
}

fn check_fingerprint(value: &str) -> Result<(), AssertionError> {
    if value.len() < MIN_FINGERPRINT_HEX_LEN {
        return Err(bad_value("fingerprint", value, "must be at least 2 bytes long"));
    }
    if value.len() > PGP_FINGERPRINT_HEX_LEN {
        return Err(bad_value("fingerprint", value, "too long"));
    }
    if !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(bad_value("fingerprint", value, "not hex"));
    }
    Ok(())
}

fn check_hostname(service: &str, value: &str) -> Result<(), AssertionError> {
    let labels_ok = value.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if value.contains('.') && labels_ok {
        Ok(())
    } else {
        Err(bad_value(service, value, "not a valid hostname"))
    }
}

fn check_social(service: &str, value: &str) -> Result<(), AssertionError> {
    if !service.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(bad_value(service, value, "unknown service"));
    }
    if value.len() > MAX_SOCIAL_NAME_LEN {
        return Err(bad_value(service, value, "name too long"));
    }
    Ok(())
}

/// Parse and normalise a single factor such as `alice@twitter`,
/// `dns://example.com` or a bare username.
pub fn parse_url(s: &str) -> Result<AssertionUrl, AssertionError> {
    let (service, value) = split_factor(s)?;
    let service = service.unwrap_or("keybase").to_lowercase();
    let value = value.to_lowercase();

    if value.is_empty() {
        return Err(bad_value(&service, &value, "missing value"));
    }

    let kind = match service.as_str() {
        "keybase" => {
            check_username(&value)?;
            FactorKind::Keybase
        }
        "uid" => {
            IdentityId::from_hex(&value).map_err(|e| bad_value("uid", &value, &e.to_string()))?;
            FactorKind::Uid
        }
        "fingerprint" | "pgp" => {
            check_fingerprint(&value)?;
            return Ok(AssertionUrl::new(FactorKind::Fingerprint, "fingerprint", value));
        }
        "web" => {
            check_hostname(&service, &value)?;
            FactorKind::Web
        }
        "http" => {
            check_hostname(&service, &value)?;
            FactorKind::Http
        }
        "https" => {
            check_hostname(&service, &value)?;
            FactorKind::Https
        }
        "dns" => {
            check_hostname(&service, &value)?;
            FactorKind::Dns
        }
        "email" | "phone" => {
            return Err(bad_value(&service, &value, "unsupported assertion type"));
        }
        _ => {
            check_social(&service, &value)?;
            FactorKind::Social
        }
    };
    Ok(AssertionUrl::new(kind, service, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> AssertionUrl {
        parse_url(s).unwrap()
    }

    #[test]
    fn factor_forms() {
        assert_eq!(url("alice@twitter"), AssertionUrl::new(FactorKind::Social, "twitter", "alice"));
        assert_eq!(url("twitter:Alice"), AssertionUrl::new(FactorKind::Social, "twitter", "alice"));
        assert_eq!(url("dns://example.com"), AssertionUrl::new(FactorKind::Dns, "dns", "example.com"));
        assert_eq!(url("alice"), AssertionUrl::new(FactorKind::Keybase, "keybase", "alice"));
        assert_eq!(
            url("pgp:C0FFEE"),
            AssertionUrl::new(FactorKind::Fingerprint, "fingerprint", "c0ffee")
        );
    }

    #[test]
    fn last_at_sign_wins() {
        // "a@b@twitter" has an invalid name before the last '@'
        assert!(matches!(parse_url("a@b@twitter"), Err(AssertionError::InvalidFactor(_))));
        assert_eq!(url("example.com@web").kind, FactorKind::Web);
    }

    #[test]
    fn value_validation() {
        assert!(parse_url("uid:1234").is_err());
        assert!(parse_url(&format!("uid:{}", "ab".repeat(16))).is_ok());
        assert!(parse_url("fingerprint:abc").is_err());
        assert!(parse_url("fingerprint:xyzw").is_err());
        assert!(parse_url("localhost@dns").is_err());
        assert!(parse_url("a").is_err());
        assert!(parse_url("twitter:").is_err());
        assert!(parse_url("alice@example.com").is_err());
        assert!(parse_url("bob@email").is_err());
    }

    #[test]
    fn precedence_and_grouping() {
        let expr = parse("alice@twitter+alice@github,bob").unwrap();
        assert_eq!(expr.to_string(), "alice@twitter+alice@github,bob");
        assert!(matches!(&expr, AssertionExpression::Or(terms) if terms.len() == 2));

        let grouped = parse("alice && (alice@github || alice@reddit)").unwrap();
        assert_eq!(grouped.to_string(), "alice+(alice@github,alice@reddit)");
    }

    #[test]
    fn single_factor_is_not_wrapped() {
        assert!(matches!(parse(" alice ").unwrap(), AssertionExpression::Url(_)));
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(parse(""), Err(AssertionError::Empty));
        assert!(matches!(parse("alice+"), Err(AssertionError::Syntax { offset: 6, .. })));
        assert!(matches!(parse("(alice"), Err(AssertionError::Syntax { .. })));
        assert!(matches!(parse("alice)"), Err(AssertionError::Syntax { .. })));
        assert!(matches!(parse("alice & bob"), Err(AssertionError::Syntax { offset: 6, .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |d: usize| format!("{}alice{}", "(".repeat(d), ")".repeat(d));

        assert!(matches!(parse(&nested(MAX_NESTING)).unwrap(), AssertionExpression::Url(_)));
        match parse(&nested(MAX_NESTING + 1)) {
            Err(AssertionError::Syntax { offset, reason }) => {
                assert_eq!(offset, MAX_NESTING);
                assert_eq!(reason, "nesting too deep");
            }
            other => panic!("unexpected: {other:?}"),
        }
        for depth in [2_000, 30_000] {
            assert!(parse(&nested(depth)).is_err());
        }
    }
}
