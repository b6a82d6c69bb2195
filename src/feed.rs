use clap::ValueEnum;

/// Which update feed to walk. The base game and the expansion publish to
/// separate paginated indexes and name their wiki pages with different
/// file prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Feed {
    /// Base game updates
    Base,
    /// Spaced Out! expansion updates
    So,
}

impl Feed {
    pub fn index_url(self) -> &'static str {
        match self {
            Feed::Base => "https://forums.kleientertainment.com/game-updates/oni-alpha/",
            Feed::So => "https://forums.kleientertainment.com/game-updates/oni-so/",
        }
    }

    /// Default media/page prefix. Overridable on the base feed; the
    /// expansion always publishes as EX1.
    pub fn prefix(self) -> &'static str {
        match self {
            Feed::Base => "U33",
            Feed::So => "EX1",
        }
    }

    pub fn is_expansion(self) -> bool {
        matches!(self, Feed::So)
    }
}
