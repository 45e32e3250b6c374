//! Identifiers with validated constructors.

use clinic_monitor_shared::{ErrorCode, ErrorEnvelope};
use std::fmt;
use std::sync::Arc;

/// Validation failures for identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    /// Class name is empty after trimming.
    #[error("class name must be non-empty")]
    EmptyClassName,
    /// Method name is empty after trimming.
    #[error("method name must be non-empty")]
    EmptyMethodName,
    /// A `Class.method` / `Class.*` target could not be parsed.
    #[error("invalid method target `{input}`; expected `Class.method` or `Class.*`")]
    InvalidMethodTarget {
        /// Raw target string.
        input: String,
    },
    /// Dependency name is empty after trimming.
    #[error("dependency name must be non-empty")]
    EmptyDependencyName,
    /// Cache region name is empty after trimming.
    #[error("cache region name must be non-empty")]
    EmptyRegionName,
}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let code = match &error {
            PrimitiveError::EmptyClassName
            | PrimitiveError::EmptyMethodName
            | PrimitiveError::InvalidMethodTarget { .. } => {
                ErrorCode::new("domain", "invalid_method_id")
            },
            PrimitiveError::EmptyDependencyName => ErrorCode::new("domain", "invalid_dependency"),
            PrimitiveError::EmptyRegionName => ErrorCode::new("domain", "invalid_cache_region"),
        };
        let envelope = Self::expected(code, error.to_string());
        match error {
            PrimitiveError::InvalidMethodTarget { input } => envelope.with_metadata("input", input),
            _ => envelope,
        }
    }
}

fn non_empty(value: &str, error: PrimitiveError) -> Result<Arc<str>, PrimitiveError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(error)
    } else {
        Ok(Arc::from(trimmed))
    }
}

/// Identity of a monitored method: owning type plus method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    class: Arc<str>,
    method: Arc<str>,
}

impl MethodId {
    /// Build an id from a type name and a method name.
    pub fn new(class: impl AsRef<str>, method: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        Ok(Self {
            class: non_empty(class.as_ref(), PrimitiveError::EmptyClassName)?,
            method: non_empty(method.as_ref(), PrimitiveError::EmptyMethodName)?,
        })
    }

    /// Owning type name (the `class` tag).
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Method name (the `method` tag).
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.class, self.method)
    }
}

/// Target of a declarative policy: one method, or every method of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyTarget {
    /// `Class.method`
    Method(MethodId),
    /// `Class.*`
    Type(Arc<str>),
}

impl PolicyTarget {
    /// Parse `Class.method` or `Class.*`.
    ///
    /// The split happens at the last `.`, so nested type paths such as
    /// `billing.InvoiceService.issue` keep their prefix in the class part.
    pub fn parse(input: &str) -> Result<Self, PrimitiveError> {
        let invalid = || PrimitiveError::InvalidMethodTarget {
            input: input.to_owned(),
        };
        let (class, method) = input.trim().rsplit_once('.').ok_or_else(invalid)?;
        let class = non_empty(class, invalid())?;
        match method.trim() {
            "" => Err(invalid()),
            "*" => Ok(Self::Type(class)),
            method => Ok(Self::Method(MethodId {
                class,
                method: Arc::from(method),
            })),
        }
    }
}

impl fmt::Display for PolicyTarget {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(id) => write!(formatter, "{id}"),
            Self::Type(class) => write!(formatter, "{class}.*"),
        }
    }
}

/// Name of a remote dependency guarded by a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyName(Arc<str>);

impl DependencyName {
    /// Parse a dependency name; surrounding whitespace is trimmed.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        non_empty(value.as_ref(), PrimitiveError::EmptyDependencyName).map(Self)
    }

    /// Borrow as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Name of a cache region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionName(Arc<str>);

impl RegionName {
    /// Parse a region name; surrounding whitespace is trimmed.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        non_empty(value.as_ref(), PrimitiveError::EmptyRegionName).map(Self)
    }

    /// Borrow as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
