use crate::api::GithubApiClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildmerit_core::ports::{CodeHostReader, CodeHostWriter};
use guildmerit_core::{AdapterResult, ContributionEvent, OpenIssue, OpenPullRequest};

#[async_trait]
impl CodeHostReader for GithubApiClient {
    async fn list_contributions(
        &self,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<ContributionEvent>> {
        Ok(GithubApiClient::list_contributions(self, since).await?)
    }

    async fn list_open_issues(&self) -> AdapterResult<Vec<OpenIssue>> {
        Ok(GithubApiClient::list_open_issues(self).await?)
    }

    async fn list_open_pull_requests(&self) -> AdapterResult<Vec<OpenPullRequest>> {
        Ok(GithubApiClient::list_open_pull_requests(self).await?)
    }

    fn discovered_repo_count(&self) -> Option<usize> {
        GithubApiClient::discovered_repo_count(self)
    }
}

#[async_trait]
impl CodeHostWriter for GithubApiClient {
    async fn assign(&self, repo: &str, number: u64, assignee: &str) -> AdapterResult<()> {
        Ok(self.assign_issue(repo, number, assignee).await?)
    }

    async fn request_review(&self, repo: &str, number: u64, reviewer: &str) -> AdapterResult<()> {
        Ok(GithubApiClient::request_review(self, repo, number, reviewer).await?)
    }
}
