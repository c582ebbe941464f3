pub trait OptionExt<T> {
    fn to_result<E, F>(self, on_empty: F) -> Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T> OptionExt<T> for Option<T> {
    fn to_result<E, F>(self, on_empty: F) -> Result<T, E>
    where
        F: FnOnce() -> E,
    {
        match self {
            Some(v) => Ok(v),
            None => Err(on_empty()),
        }
    }
}

pub trait BlankExt {
    /// `None` when the string is empty or only whitespace.
    fn non_blank(&self) -> Option<&str>;
}

impl BlankExt for str {
    fn non_blank(&self) -> Option<&str> {
        if self.trim().is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
