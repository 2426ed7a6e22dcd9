//! Label selection for HBN scans.
//!
//! A label is the comma-delimited string `operation,element,group,variable`.
//! Empty fields and the literal `None` are wildcards. The element field may
//! be a range expression (`1:4+16:22`), which expands into one [`LabelSpec`]
//! per element.

use std::fmt;

use crate::core::constants::{ELEMENT_MAX, ELEMENT_MIN};
use crate::core::error::{HspfError, Result};
use crate::core::format::{DecodedKey, Interval, Operation};

/// Expands a range expression into the list of integers it names.
///
/// Groups are joined by `+`; each group is `n`, `start:end` or
/// `start:end:step`, with `end` inclusive.
pub fn parse_range(spec: &str) -> Result<Vec<i64>> {
    let mut numbers = Vec::new();

    for sub in spec.split('+') {
        let parts = sub
            .split(':')
            .map(|p| {
                p.trim().parse::<i64>().map_err(|_| {
                    HspfError::InvalidRange(format!(
                        "in '{}' of '{}': {:?} is not an integer",
                        sub, spec, p
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        match parts.as_slice() {
            [n] => numbers.push(*n),
            [start, end] | [start, end, _] => {
                if start > end {
                    return Err(HspfError::InvalidRange(format!(
                        "in '{}' of '{}': start {} is greater than end {}",
                        sub, spec, start, end
                    )));
                }
                let step = parts.get(2).copied().unwrap_or(1);
                if step == 0 {
                    return Err(HspfError::InvalidRange(format!(
                        "in '{}' of '{}': step must not be zero",
                        sub, spec
                    )));
                }
                if step > 0 {
                    let mut n = *start;
                    while n <= *end {
                        numbers.push(n);
                        n += step;
                    }
                }
            }
            _ => {
                return Err(HspfError::InvalidRange(format!(
                    "'{}' of '{}': use integers or colon-delimited groups such as \
                     \"99\", \"1:2\" or \"101:120\", joined by \"+\" (e.g. \"1:4+16:22+30\")",
                    sub, spec
                )))
            }
        }
    }

    Ok(numbers)
}

/// Dataset numbers named by a range expression such as `"1:2+5"`.
pub fn parse_dsn_list(spec: &str) -> Result<Vec<i32>> {
    parse_range(spec)?
        .into_iter()
        .map(|n| {
            i32::try_from(n)
                .map_err(|_| HspfError::InvalidRange(format!("dataset number {} out of range", n)))
        })
        .collect()
}

/// Position-wise pattern; `None` in any slot is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelTuple {
    pub operation: Option<String>,
    pub element: Option<u32>,
    pub group: Option<String>,
    pub variable: Option<String>,
    pub interval_code: Option<u32>,
}

fn merge_slot<T: PartialEq + Clone>(a: &Option<T>, b: &Option<T>) -> Option<Option<T>> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => None,
        (Some(x), _) => Some(Some(x.clone())),
        (None, other) => Some(other.clone()),
    }
}

impl LabelTuple {
    /// Matches two patterns slot by slot and returns their merge.
    ///
    /// A slot matches when either side is a wildcard or both are equal; the
    /// merge keeps the concrete value wherever one exists.
    pub fn try_match(&self, other: &LabelTuple) -> Option<LabelTuple> {
        Some(LabelTuple {
            operation: merge_slot(&self.operation, &other.operation)?,
            element: merge_slot(&self.element, &other.element)?,
            group: merge_slot(&self.group, &other.group)?,
            variable: merge_slot(&self.variable, &other.variable)?,
            interval_code: merge_slot(&self.interval_code, &other.interval_code)?,
        })
    }

    /// Converts a fully concrete tuple into a key.
    pub fn into_key(self) -> Option<DecodedKey> {
        Some(DecodedKey {
            operation: self.operation?,
            element: self.element?,
            group: self.group?,
            variable: self.variable?,
            interval_code: self.interval_code?,
        })
    }
}

impl From<&DecodedKey> for LabelTuple {
    fn from(key: &DecodedKey) -> Self {
        Self {
            operation: Some(key.operation.clone()),
            element: Some(key.element),
            group: Some(key.group.clone()),
            variable: Some(key.variable.clone()),
            interval_code: Some(key.interval_code),
        }
    }
}

/// A validated label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelSpec {
    pub operation: Option<Operation>,
    pub element: Option<u32>,
    pub group: Option<String>,
    pub variable: Option<String>,
    pub interval_code: Option<u32>,
}

impl LabelSpec {
    /// The label that matches everything.
    pub fn any() -> Self {
        Self {
            operation: None,
            element: None,
            group: None,
            variable: None,
            interval_code: None,
        }
    }

    pub fn with_interval(mut self, interval: Option<Interval>) -> Self {
        self.interval_code = interval.map(Interval::code);
        self
    }

    pub fn pattern(&self) -> LabelTuple {
        LabelTuple {
            operation: self.operation.map(|op| op.as_str().to_string()),
            element: self.element,
            group: self.group.clone(),
            variable: self.variable.clone(),
            interval_code: self.interval_code,
        }
    }

    pub fn try_match(&self, candidate: &DecodedKey) -> Option<DecodedKey> {
        self.pattern()
            .try_match(&LabelTuple::from(candidate))
            .and_then(LabelTuple::into_key)
    }
}

impl fmt::Display for LabelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }
        write!(
            f,
            "{},{},{},{}",
            slot(&self.operation),
            slot(&self.element),
            slot(&self.group),
            slot(&self.variable)
        )?;
        if let Some(code) = self.interval_code {
            write!(f, ",{}", code)?;
        }
        Ok(())
    }
}

fn wildcard(word: Option<&str>) -> Option<&str> {
    word.map(str::trim).filter(|w| !w.is_empty() && *w != "None")
}

/// Validates the four label words, expanding an element range.
pub fn validate(words: [Option<&str>; 4]) -> Result<Vec<LabelSpec>> {
    let [operation, element, group, variable] = words.map(wildcard);

    let operation = operation.map(str::parse::<Operation>).transpose()?;

    let elements: Vec<Option<u32>> = match element {
        None => vec![None],
        Some(word) => {
            let numbers = match word.parse::<i64>() {
                Ok(n) => vec![n],
                Err(_) => parse_range(word)?,
            };
            numbers
                .into_iter()
                .map(|n| {
                    if (ELEMENT_MIN..=ELEMENT_MAX).contains(&n) {
                        Ok(Some(n as u32))
                    } else {
                        Err(HspfError::InvalidLabel(format!(
                            "the land use element must be an integer from 1 to 999 \
                             inclusive, not {}",
                            n
                        )))
                    }
                })
                .collect::<Result<_>>()?
        }
    };

    let group = match (group.map(str::to_uppercase), operation) {
        (None, _) => None,
        (Some(g), None) => {
            return Err(HspfError::InvalidLabel(format!(
                "group {} needs an operation type to be validated against",
                g
            )))
        }
        (Some(g), Some(op)) => {
            if !op.allowed_groups().contains(&g.as_str()) {
                return Err(HspfError::InvalidLabel(format!(
                    "the {} operation type only allows the variable groups {:?}, not {}",
                    op,
                    op.allowed_groups(),
                    g
                )));
            }
            Some(g)
        }
    };

    let variable = variable.map(str::to_string);

    Ok(elements
        .into_iter()
        .map(|element| LabelSpec {
            operation,
            element,
            group: group.clone(),
            variable: variable.clone(),
            interval_code: None,
        })
        .collect())
}

/// Parses and validates one `operation,element,group,variable` label.
pub fn validate_label(label: &str) -> Result<Vec<LabelSpec>> {
    let words: Vec<&str> = label.split(',').collect();
    match words.as_slice() {
        [op, element, group, variable] => {
            validate([Some(*op), Some(*element), Some(*group), Some(*variable)])
        }
        _ => Err(HspfError::InvalidLabel(format!(
            "the label '{}' has {} fields, expected 4",
            label,
            words.len()
        ))),
    }
}

/// Validates every label, keeping the first occurrence of duplicates.
pub fn validate_labels<S: AsRef<str>>(labels: &[S]) -> Result<Vec<LabelSpec>> {
    let mut specs: Vec<LabelSpec> = Vec::new();
    for label in labels {
        for spec in validate_label(label.as_ref())? {
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
    }
    Ok(specs)
}
