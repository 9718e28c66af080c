pub mod api;
pub mod error;
mod port;
pub mod types;

pub use api::GithubApiClient;
pub use error::{GithubError, GithubResult};
pub use types::{
    CommentTarget, IssueFacts, PullRequestFacts, comment_events, issue_events,
    pull_request_events, review_events,
};
