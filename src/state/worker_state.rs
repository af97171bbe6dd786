/// Worker state definitions for the per-page crawl cycle
///
/// A worker moves through these states once for every work item it takes from the
/// frontier and parks in `Idle` between items.
use std::fmt;

/// Represents what a crawl worker is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkerState {
    /// Waiting for the frontier to hand out work
    #[default]
    Idle,

    /// Sending the request and reading the response head
    FetchingHeader,

    /// Deciding what to do with a redirect or a changed effective URL
    ValidatingRedirect,

    /// Reading the response body
    FetchingBody,

    /// Handing the body to the content parser
    Parsing,

    /// Admitting outgoing links into the frontier
    SchedulingLinks,

    /// Running the visitor callback
    Visiting,

    /// The frontier is finished and the worker has left its loop
    Finished,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true while the worker holds an item it has not finished with
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle | Self::Finished)
    }

    /// Whether the per-item state machine allows moving from `self` to `next`
    ///
    /// Any busy state may fall back to `Idle` because a failed step abandons the item.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Finished, _) => false,
            (_, Finished) => matches!(self, Idle),
            (Idle, FetchingHeader) => true,
            (FetchingHeader, ValidatingRedirect) | (FetchingHeader, FetchingBody) => true,
            (ValidatingRedirect, FetchingBody) => true,
            (FetchingBody, Parsing) => true,
            (Parsing, SchedulingLinks) | (Parsing, Visiting) => true,
            (SchedulingLinks, Visiting) => true,
            (s, Idle) => s.is_busy(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingHeader => "fetching_header",
            Self::ValidatingRedirect => "validating_redirect",
            Self::FetchingBody => "fetching_body",
            Self::Parsing => "parsing",
            Self::SchedulingLinks => "scheduling_links",
            Self::Visiting => "visiting",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
