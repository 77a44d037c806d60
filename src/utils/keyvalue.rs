//! `key = value` files, as used by `.SRCINFO` and `.PKGINFO`
use anyhow::{bail, Result};
use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::rest,
    IResult,
};

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_line(i: &str) -> IResult<&str, (&str, &str)> {
    let (i, _) = space0(i)?;
    let (i, key) = take_while1(is_key_char)(i)?;
    let (i, _) = space0(i)?;
    let (i, _) = char('=')(i)?;
    let (i, _) = space0(i)?;
    let (i, value) = rest(i)?;

    Ok((i, (key, value.trim_end())))
}

/// Parse all pairs in file order; blank lines and `#` comments are skipped
pub fn parse_str(content: &str) -> Result<Vec<(String, String)>> {
    let mut res = Vec::new();
    for (no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok((_, (key, value))) => res.push((key.to_owned(), value.to_owned())),
            Err(e) => bail!("malformed line {}: {}", no + 1, e),
        }
    }
    Ok(res)
}
