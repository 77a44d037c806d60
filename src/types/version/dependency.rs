use super::PkgVersion;
use crate::types::ArchitectError;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepOperator {
    None,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

// Two character operators must come first, or `>=` would be taken for `>`
const OPERATORS: &[(&str, DepOperator)] = &[
    (">=", DepOperator::Ge),
    ("<=", DepOperator::Le),
    (">", DepOperator::Gt),
    ("<", DepOperator::Lt),
    ("=", DepOperator::Eq),
];

impl DepOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepOperator::None => "",
            DepOperator::Eq => "=",
            DepOperator::Lt => "<",
            DepOperator::Gt => ">",
            DepOperator::Le => "<=",
            DepOperator::Ge => ">=",
        }
    }
}

/// A dependency such as `glibc>=2.33`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    pub op: DepOperator,
    pub version: Option<PkgVersion>,
}

impl DependencySpec {
    pub fn parse(s: &str) -> Result<Self, ArchitectError> {
        for (token, op) in OPERATORS {
            // Split on the last occurrence of the operator
            if let Some((name, version)) = s.rsplit_once(token) {
                if name.is_empty() {
                    return Err(ArchitectError::MalformedDependency(s.to_owned()));
                }
                return Ok(DependencySpec {
                    name: name.to_owned(),
                    op: *op,
                    version: Some(PkgVersion::parse(version)?),
                });
            }
        }

        if s.is_empty() {
            return Err(ArchitectError::MalformedDependency(s.to_owned()));
        }
        Ok(DependencySpec {
            name: s.to_owned(),
            op: DepOperator::None,
            version: None,
        })
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, "{}{}", self.op.as_str(), version)?;
        }
        Ok(())
    }
}
