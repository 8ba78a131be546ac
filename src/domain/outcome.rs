// ============================================================================
// Best-effort Outcome
// ============================================================================
//
// Hard failures travel as `Err`. Soft failures travel as `Outcome::Degraded`:
// the step still produced a usable value, but a fallback was taken and the
// reason must be logged by whoever consumes it.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Exact(T),
    Degraded { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Outcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Exact(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Exact(_) => None,
            Outcome::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Exact(value) | Outcome::Degraded { value, .. } => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Exact(value) => Outcome::Exact(f(value)),
            Outcome::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
