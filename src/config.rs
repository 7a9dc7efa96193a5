//! Tunables for the quiescence layer.

use crate::error::Error;
use crate::rank::Tag;

/// Tag carried by identity-exchange messages.
pub const DEFAULT_IDENTITY_TAG: Tag = Tag(1512);

/// Tag carried by index-replay messages.
pub const DEFAULT_INDEX_TAG: Tag = Tag(1513);

/// Message tags used by topology discovery.
///
/// The two tags must differ: identity-exchange receives match any source, so
/// an index-replay message carrying the same tag would be taken for a
/// successor's rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub identity_tag: Tag,
    pub index_tag: Tag,
}

impl Default for Config {
    fn default() -> Self {
        return Config {
            identity_tag: DEFAULT_IDENTITY_TAG,
            index_tag: DEFAULT_INDEX_TAG,
        };
    }
}

impl Config {
    /// Replace the identity-exchange tag.
    pub fn with_identity_tag(mut self, tag: Tag) -> Config {
        self.identity_tag = tag;
        return self;
    }

    /// Replace the index-replay tag.
    pub fn with_index_tag(mut self, tag: Tag) -> Config {
        self.index_tag = tag;
        return self;
    }

    /// Check that the configuration can drive discovery.
    pub fn validate(&self) -> Result<(), Error> {
        if self.identity_tag == self.index_tag {
            return Err(Error::InvalidConfig(format!(
                "identity and index tags must differ (both {})",
                self.identity_tag.0
            )));
        }
        return Ok(());
    }
}
