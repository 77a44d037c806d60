pub mod archive;
pub mod keyvalue;
pub mod lock;
pub mod pacparse;
pub mod verify;

use lazy_static::lazy_static;
use regex::Regex;

/// Turn a URL or path into something usable as a single directory name
pub fn slugify(s: &str) -> String {
    lazy_static! {
        static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
    }
    NON_WORD.replace_all(&s.to_lowercase(), "-").into_owned()
}
