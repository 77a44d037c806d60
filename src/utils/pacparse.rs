/// Parse pacman style package database files
use anyhow::{bail, Result};
use nom::{
    bytes::complete::take_till,
    character::complete::{alphanumeric1, char},
    IResult,
};
use std::collections::HashMap;

/// Parse the key part of a paragraph, like `%NAME%`
fn parse_key(i: &str) -> IResult<&str, &str> {
    let (i, _) = char('%')(i)?;
    let (i, key) = alphanumeric1(i)?;
    let (i, _) = char('%')(i)?;
    // There should be a newline after the key line
    let (i, _) = char('\n')(i)?;

    Ok((i, key))
}

/// Parse the value part of a paragraph that ends with an empty line or EOF
fn parse_value(mut i: &str) -> IResult<&str, Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let (x, content) = take_till(|c| c == '\n')(i)?;
        let (x, _) = char('\n')(x)?;
        i = x;
        if content.is_empty() {
            break;
        }
        lines.push(content.to_owned());
        if x.is_empty() {
            break;
        }
    }
    Ok((i, lines))
}

/// Parse a key-value pair in pacman's package description syntax
fn parse_pair(i: &str) -> IResult<&str, (String, Vec<String>)> {
    let (i, key) = parse_key(i)?;
    let (i, lines) = parse_value(i)?;

    Ok((i, (key.to_owned(), lines)))
}

/// Parse one `desc` or `depends` file into `KEY => lines`
pub fn parse_str(content: &str) -> Result<HashMap<String, Vec<String>>> {
    // The value parser relies on every line being terminated
    let owned;
    let mut i = if content.ends_with('\n') {
        content
    } else {
        owned = format!("{}\n", content);
        owned.as_str()
    };

    let mut res = HashMap::new();
    let mut counter = 0;
    loop {
        i = i.trim_start_matches('\n');
        if i.is_empty() {
            break;
        }
        match parse_pair(i) {
            Ok((x, pair)) => {
                res.insert(pair.0, pair.1);
                counter += 1;
                i = x;
            }
            Err(e) => {
                bail!("bad pacman database on paragraph {counter}: {e}");
            }
        }
    }
    Ok(res)
}

/// Get the only value of a single-valued field
pub fn get_first(name: &str, f: &HashMap<String, Vec<String>>) -> Result<String> {
    match f.get(name).map(Vec::as_slice) {
        Some([value]) => Ok(value.clone()),
        Some(values) => bail!("expect 1 value for {name}, found {}", values.len()),
        None => bail!("field {name} not found"),
    }
}

/// Get all values of a field, it's fine to have nothing
pub fn get_list<'a>(name: &str, f: &'a HashMap<String, Vec<String>>) -> &'a [String] {
    f.get(name).map(Vec::as_slice).unwrap_or_default()
}

/// Render fields back into the paragraph syntax, keeping the given key order
pub fn write_str(fields: &[(&str, Vec<String>)]) -> String {
    let mut out = String::new();
    for (key, values) in fields {
        if values.is_empty() {
            continue;
        }
        out.push_str(&format!("%{}%\n", key));
        for value in values {
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
