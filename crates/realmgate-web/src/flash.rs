//! One-shot notices carried across a redirect.
//!
//! A handler records notices in a [`Flash`], stores it in the session and
//! redirects; the next page that renders takes (and thereby clears) them.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Flash {
    pub error: Vec<String>,
    pub warning: Vec<String>,
    pub alert: Vec<String>,
}

impl Flash {
    pub fn error(&mut self, message: impl Into<String>) {
        self.error.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warning.push(message.into());
    }

    pub fn alert(&mut self, message: impl Into<String>) {
        self.alert.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.error.is_empty() && self.warning.is_empty() && self.alert.is_empty()
    }

    /// Appends `other`'s notices after the ones already pending.
    pub fn merge(&mut self, other: Flash) {
        self.error.extend(other.error);
        self.warning.extend(other.warning);
        self.alert.extend(other.alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_flash_is_empty() {
        assert!(Flash::default().is_empty());
    }

    #[test]
    fn notices_land_in_their_level() {
        let mut flash = Flash::default();
        flash.error("bad");
        flash.warning("careful");
        flash.alert("done");

        assert_eq!(flash.error, vec!["bad"]);
        assert_eq!(flash.warning, vec!["careful"]);
        assert_eq!(flash.alert, vec!["done"]);
        assert!(!flash.is_empty());
    }

    #[test]
    fn merge_keeps_order() {
        let mut pending = Flash::default();
        pending.error("first");
        let mut next = Flash::default();
        next.error("second");
        next.alert("third");

        pending.merge(next);

        assert_eq!(pending.error, vec!["first", "second"]);
        assert_eq!(pending.alert, vec!["third"]);
    }
}
