//! Topic and subscription names.
//!
//! Callers may pass either a short name (`orders`) or a fully qualified one
//! (`projects/my-project/topics/orders`). Short names are qualified with the
//! broker's project; fully qualified names must name that same project.

use std::fmt;

use super::error::BrokerError;

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 255;

/// A fully qualified topic name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName {
    project: String,
    name: String,
}

/// A fully qualified subscription name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionName {
    project: String,
    name: String,
}

impl TopicName {
    /// Resolve `raw` against `project`, validating the short name.
    pub fn parse(project: &str, raw: &str) -> Result<Self, BrokerError> {
        let name = resolve(project, raw, "topics")?;
        Ok(Self {
            project: project.to_string(),
            name,
        })
    }

    /// The short (unqualified) topic name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SubscriptionName {
    /// Resolve `raw` against `project`, validating the short name.
    pub fn parse(project: &str, raw: &str) -> Result<Self, BrokerError> {
        let name = resolve(project, raw, "subscriptions")?;
        Ok(Self {
            project: project.to_string(),
            name,
        })
    }

    /// The short (unqualified) subscription name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project, self.name)
    }
}

impl fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/subscriptions/{}", self.project, self.name)
    }
}

/// Strip a `projects/<p>/<kind>/` prefix if present and validate what remains.
fn resolve(project: &str, raw: &str, kind: &str) -> Result<String, BrokerError> {
    let short = match raw.strip_prefix("projects/") {
        Some(rest) => {
            let mut parts = rest.splitn(3, '/');
            let (owner, segment, short) = (parts.next(), parts.next(), parts.next());
            match (owner, segment, short) {
                (Some(owner), Some(segment), Some(short)) if segment == kind => {
                    if owner != project {
                        return Err(BrokerError::InvalidName(format!(
                            "{raw} belongs to project {owner}, expected {project}"
                        )));
                    }
                    short
                }
                _ => {
                    return Err(BrokerError::InvalidName(format!(
                        "{raw} is not of the form projects/<project>/{kind}/<name>"
                    )))
                }
            }
        }
        None => raw,
    };

    validate(short)?;
    Ok(short.to_string())
}

fn validate(name: &str) -> Result<(), BrokerError> {
    if name.len() < MIN_LEN || name.len() > MAX_LEN {
        return Err(BrokerError::InvalidName(format!(
            "{name:?} must be between {MIN_LEN} and {MAX_LEN} characters"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(BrokerError::InvalidName(format!(
            "{name:?} must start with a letter"
        )));
    }
    if name.starts_with("goog") {
        return Err(BrokerError::InvalidName(format!(
            "{name:?} must not start with \"goog\""
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "-_.~+%".contains(*c)))
    {
        return Err(BrokerError::InvalidName(format!(
            "{name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
