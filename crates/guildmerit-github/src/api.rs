use crate::error::{GithubError, GithubResult};
use crate::types::{
    CommentRecord, CommentTarget, IssueFacts, IssueRecord, PullRequestFacts, PullRequestRecord,
    ReviewRecord, comment_events, issue_events, pull_request_events, review_events,
};
use chrono::{DateTime, Utc};
use guildmerit_core::{ContributionEvent, OpenIssue, OpenPullRequest, RepoFilter, repo_allowed};
use octocrab::{Octocrab, Page, params};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// GitHub API client scoped to one organization
pub struct GithubApiClient {
    client: Octocrab,
    org: String,
    repo_filter: Option<RepoFilter>,
    repos: OnceCell<Vec<String>>,
}

impl GithubApiClient {
    /// Create new GitHub API client with authentication token
    ///
    /// `api_url` overrides the default `https://api.github.com` (GitHub Enterprise).
    pub fn new(token: &SecretString, org: &str, api_url: Option<&str>) -> GithubResult<Self> {
        if org.trim().is_empty() {
            return Err(GithubError::ConfigError("github.org must not be empty".to_string()));
        }

        let mut builder = Octocrab::builder().personal_token(token.expose_secret().to_string());
        if let Some(url) = api_url {
            builder = builder.base_uri(url).map_err(|e| {
                GithubError::ConfigError(format!("Invalid GitHub API url {}: {}", url, e))
            })?;
        }
        let client = builder.build().map_err(|e| {
            GithubError::ApiError(format!("Failed to create octocrab client: {}", e))
        })?;

        Ok(Self::from_octocrab(client, org))
    }

    /// Create client from existing octocrab instance
    pub fn from_octocrab(client: Octocrab, org: &str) -> Self {
        Self {
            client,
            org: org.to_string(),
            repo_filter: None,
            repos: OnceCell::new(),
        }
    }

    /// Restrict every operation to repositories the filter lets through
    pub fn with_repo_filter(mut self, filter: Option<RepoFilter>) -> Self {
        self.repo_filter = filter;
        self
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// Repositories discovered so far, once discovery has run
    pub fn discovered_repo_count(&self) -> Option<usize> {
        self.repos.get().map(Vec::len)
    }

    /// Non-archived organization repositories that pass the filter (discovered once)
    pub async fn repositories(&self) -> GithubResult<&[String]> {
        let repos = self
            .repos
            .get_or_try_init(|| async {
                let first = self
                    .client
                    .orgs(&self.org)
                    .list_repos()
                    .per_page(100)
                    .send()
                    .await
                    .map_err(|e| {
                        GithubError::ApiError(format!(
                            "Failed to list repositories for {}: {}",
                            self.org, e
                        ))
                    })?;
                let all = self.client.all_pages(first).await?;

                if all.is_empty() {
                    info!("Organization {} has no repositories yet", self.org);
                }

                let mut names: Vec<String> = all
                    .into_iter()
                    .filter(|repo| !repo.archived.unwrap_or(false))
                    .map(|repo| repo.name)
                    .filter(|name| repo_allowed(self.repo_filter.as_ref(), name))
                    .collect();
                names.sort();

                if names.is_empty() {
                    warn!("All repositories in {} filtered out; skipping ingestion", self.org);
                } else {
                    info!("Discovered {} repositories in {}", names.len(), self.org);
                }
                Ok::<_, GithubError>(names)
            })
            .await?;

        Ok(repos.as_slice())
    }

    /// Contribution events since `since` across every repository
    pub async fn list_contributions(
        &self,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<ContributionEvent>> {
        let mut events = Vec::new();

        for repo in self.repositories().await? {
            events.extend(self.repo_contributions(repo, since).await?);
        }

        Ok(events)
    }

    /// Issue, pull request, review and comment events of one repository
    async fn repo_contributions(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<ContributionEvent>> {
        let issues: Vec<IssueFacts> = self
            .recent_issues(repo, since)
            .await?
            .iter()
            .map(IssueFacts::from)
            .filter(|issue| !issue.is_pull_request)
            .collect();
        let prs: Vec<PullRequestFacts> = self
            .recent_pull_requests(repo, since)
            .await?
            .iter()
            .map(PullRequestFacts::from)
            .collect();

        let mut events = Vec::new();

        for issue in &issues {
            events.extend(issue_events(repo, issue, since));

            let comments = self.issue_comments(repo, issue.number, since).await?;
            let target = CommentTarget::Issue(issue.number);
            events.extend(comment_events(repo, target, &comments, since));
        }

        for pr in &prs {
            events.extend(pull_request_events(repo, pr, since));

            let reviews: Vec<ReviewRecord> = self
                .get_all(&self.route(repo, &format!("pulls/{}/reviews", pr.number)), &[])
                .await?;
            events.extend(review_events(repo, pr.number, &reviews, since));

            let mut comments = self.issue_comments(repo, pr.number, since).await?;
            comments.extend(self.review_comments(repo, pr.number, since).await?);
            let target = CommentTarget::PullRequest(pr.number);
            events.extend(comment_events(repo, target, &comments, since));
        }

        info!(
            "Ingested {}/{}: {} issues and {} PRs touched, {} events",
            self.org,
            repo,
            issues.len(),
            prs.len(),
            events.len()
        );
        Ok(events)
    }

    fn route(&self, repo: &str, tail: &str) -> String {
        format!("/repos/{}/{}/{}", self.org, repo, tail)
    }

    /// Every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(
        &self,
        route: &str,
        params: &[(&str, String)],
    ) -> GithubResult<Vec<T>> {
        let mut query = vec![("per_page", "100".to_string())];
        query.extend(params.iter().cloned());

        let first: Page<T> = self
            .client
            .get(route, Some(&query))
            .await
            .map_err(|e| GithubError::ApiError(format!("GET {} failed: {}", route, e)))?;

        Ok(self.client.all_pages(first).await?)
    }

    /// Issues (and PRs, flagged as such) updated at or after `since`
    async fn recent_issues(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<IssueRecord>> {
        let params = [
            ("state", "all".to_string()),
            ("since", since.to_rfc3339()),
        ];
        self.get_all(&self.route(repo, "issues"), &params).await
    }

    /// PRs are walked newest-update first and paging stops at the first PR untouched since `since`
    async fn recent_pull_requests(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<PullRequestRecord>> {
        let route = self.route(repo, "pulls");
        let query = [
            ("state", "all"),
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", "100"),
        ];
        let mut page: Page<PullRequestRecord> = self
            .client
            .get(&route, Some(&query))
            .await
            .map_err(|e| GithubError::ApiError(format!("Failed to list PRs in {}: {}", repo, e)))?;

        let mut recent = Vec::new();
        loop {
            for pr in page.items.drain(..) {
                if pr.updated_at.is_some_and(|at| at < since) {
                    return Ok(recent);
                }
                recent.push(pr);
            }

            match self.client.get_page::<PullRequestRecord>(&page.next).await? {
                Some(next) => page = next,
                None => return Ok(recent),
            }
        }
    }

    /// Conversation comments on an issue or pull request
    async fn issue_comments(
        &self,
        repo: &str,
        number: u64,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<CommentRecord>> {
        let route = self.route(repo, &format!("issues/{}/comments", number));
        self.get_all(&route, &[("since", since.to_rfc3339())]).await
    }

    /// Inline review comments on a pull request
    async fn review_comments(
        &self,
        repo: &str,
        number: u64,
        since: DateTime<Utc>,
    ) -> GithubResult<Vec<CommentRecord>> {
        let route = self.route(repo, &format!("pulls/{}/comments", number));
        self.get_all(&route, &[("since", since.to_rfc3339())]).await
    }

    /// Open issues (pull requests excluded) with their current assignees
    pub async fn list_open_issues(&self) -> GithubResult<Vec<OpenIssue>> {
        let mut open = Vec::new();

        for repo in self.repositories().await? {
            let first = self
                .client
                .issues(&self.org, repo)
                .list()
                .state(params::State::Open)
                .per_page(100)
                .send()
                .await
                .map_err(|e| {
                    GithubError::ApiError(format!("Failed to list open issues in {}: {}", repo, e))
                })?;

            for issue in self.client.all_pages(first).await? {
                if issue.pull_request.is_some() {
                    continue;
                }
                open.push(OpenIssue {
                    repo: repo.clone(),
                    number: issue.number,
                    assignees: issue.assignees.into_iter().map(|a| a.login).collect(),
                });
            }
        }

        Ok(open)
    }

    /// Open pull requests with their authors
    pub async fn list_open_pull_requests(&self) -> GithubResult<Vec<OpenPullRequest>> {
        let mut open = Vec::new();

        for repo in self.repositories().await? {
            let first = self
                .client
                .pulls(&self.org, repo)
                .list()
                .state(params::State::Open)
                .per_page(100)
                .send()
                .await
                .map_err(|e| {
                    GithubError::ApiError(format!("Failed to list open PRs in {}: {}", repo, e))
                })?;

            for pr in self.client.all_pages(first).await? {
                open.push(OpenPullRequest {
                    repo: repo.clone(),
                    number: pr.number,
                    author: pr.user.map(|user| user.login),
                });
            }
        }

        Ok(open)
    }

    /// Add an assignee to an issue
    pub async fn assign_issue(
        &self,
        repo: &str,
        issue_number: u64,
        assignee: &str,
    ) -> GithubResult<()> {
        self.client
            .issues(&self.org, repo)
            .add_assignees(issue_number, &[assignee])
            .await
            .map_err(|e| {
                GithubError::ApiError(format!(
                    "Failed to assign {} to {}#{}: {}",
                    assignee, repo, issue_number, e
                ))
            })?;

        info!("Assigned {} to {}/{}#{}", assignee, self.org, repo, issue_number);
        Ok(())
    }

    /// Request a review on a pull request
    pub async fn request_review(
        &self,
        repo: &str,
        pr_number: u64,
        reviewer: &str,
    ) -> GithubResult<()> {
        self.client
            .pulls(&self.org, repo)
            .request_reviews(pr_number, vec![reviewer.to_string()], Vec::<String>::new())
            .await
            .map_err(|e| {
                GithubError::ApiError(format!(
                    "Failed to request review from {} on {}#{}: {}",
                    reviewer, repo, pr_number, e
                ))
            })?;

        info!("Requested review from {} on {}/{}#{}", reviewer, self.org, repo, pr_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use guildmerit_core::{EventKind, RepoFilterMode};
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, path_regex, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn install_crypto() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn at(hours: i64) -> String {
        (since() + Duration::hours(hours)).to_rfc3339()
    }

    fn user(login: &str) -> Value {
        json!({"login": login, "type": "User"})
    }

    fn mock_client(server: &MockServer) -> GithubApiClient {
        install_crypto();
        let token = SecretString::from("test-token".to_string());
        GithubApiClient::new(&token, "acme", Some(&server.uri())).expect("client")
    }

    async fn mount_json(server: &MockServer, route: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// Comment endpoints not mocked explicitly return nothing
    async fn mount_no_comments(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path_regex(r"/comments$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .with_priority(10)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_api_client() {
        install_crypto();

        let token = SecretString::from("test-token".to_string());
        let client = GithubApiClient::new(&token, "acme", None).expect("client");
        assert_eq!(client.org(), "acme");
        assert_eq!(client.discovered_repo_count(), None);
    }

    #[tokio::test]
    async fn test_create_api_client_with_custom_url() {
        install_crypto();

        let token = SecretString::from("test-token".to_string());
        let client = GithubApiClient::new(&token, "acme", Some("http://localhost:8080"))
            .expect("client")
            .with_repo_filter(Some(RepoFilter {
                mode: RepoFilterMode::Allow,
                names: vec!["core".to_string()],
            }));
        assert_eq!(client.org(), "acme");
    }

    #[tokio::test]
    async fn test_empty_org_rejected() {
        install_crypto();

        let token = SecretString::from("test-token".to_string());
        assert!(matches!(
            GithubApiClient::new(&token, " ", None),
            Err(GithubError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_pull_request_paging_stops_at_first_stale_pr() {
        let server = MockServer::start().await;
        let client = mock_client(&server);
        mount_json(&server, "/repos/acme/core/issues", json!([])).await;
        mount_no_comments(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/acme/core/pulls"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/pulls"))
            .and(query_param("sort", "updated"))
            .and(query_param("direction", "desc"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "Link",
                        format!(
                            "<{}/repos/acme/core/pulls?per_page=100&page=2>; rel=\"next\"",
                            server.uri()
                        )
                        .as_str(),
                    )
                    .set_body_json(json!([
                        {
                            "number": 12,
                            "user": user("alice"),
                            "title": "Fix parser",
                            "labels": [{"name": "hard"}],
                            "created_at": at(1),
                            "updated_at": at(6),
                            "merged_at": at(5)
                        },
                        {
                            "number": 11,
                            "user": user("bob"),
                            "title": "Old work",
                            "labels": [],
                            "created_at": at(-72),
                            "updated_at": at(-48),
                            "merged_at": at(-48)
                        }
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        mount_json(
            &server,
            "/repos/acme/core/pulls/12/reviews",
            json!([
                {"id": 1, "user": user("carol"), "state": "APPROVED", "submitted_at": at(4)},
                {"id": 2, "user": user("dave"), "state": "PENDING", "submitted_at": null}
            ]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/pulls/11/reviews"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let events = client.repo_contributions("core", since()).await.expect("events");

        let kinds: Vec<(&str, &EventKind)> =
            events.iter().map(|e| (e.user.as_str(), &e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("alice", &EventKind::PrOpened),
                ("alice", &EventKind::PrMerged),
                ("carol", &EventKind::PrReviewed),
            ]
        );
        assert_eq!(events[1].difficulty_labels(), vec!["hard"]);
        assert!(events[2].is_approval());
        assert_eq!(events[2].pr_number(), Some(12));
    }

    #[tokio::test]
    async fn test_issue_and_pull_request_comments_are_ingested() {
        let server = MockServer::start().await;
        let client = mock_client(&server);

        mount_json(
            &server,
            "/repos/acme/core/issues",
            json!([
                {
                    "number": 7,
                    "user": user("bob"),
                    "title": "Crash on start",
                    "labels": [],
                    "assignees": [],
                    "created_at": at(1),
                    "updated_at": at(3),
                    "closed_at": null
                },
                {
                    "number": 12,
                    "user": user("alice"),
                    "title": "Fix parser",
                    "created_at": at(-24),
                    "updated_at": at(4),
                    "pull_request": {"url": "https://api.github.com/repos/acme/core/pulls/12"}
                }
            ]),
        )
        .await;
        mount_json(
            &server,
            "/repos/acme/core/pulls",
            json!([{
                "number": 12,
                "user": user("alice"),
                "title": "Fix parser",
                "created_at": at(-24),
                "updated_at": at(4),
                "merged_at": null
            }]),
        )
        .await;
        mount_json(&server, "/repos/acme/core/pulls/12/reviews", json!([])).await;
        mount_json(
            &server,
            "/repos/acme/core/issues/7/comments",
            json!([
                {"id": 101, "user": user("dave"), "created_at": at(2)},
                {
                    "id": 102,
                    "user": {"login": "github-actions[bot]", "type": "Bot"},
                    "created_at": at(2)
                }
            ]),
        )
        .await;
        mount_json(
            &server,
            "/repos/acme/core/issues/12/comments",
            json!([{"id": 201, "user": user("erin"), "created_at": at(3)}]),
        )
        .await;
        mount_json(
            &server,
            "/repos/acme/core/pulls/12/comments",
            json!([{"id": 301, "user": user("erin"), "created_at": at(4)}]),
        )
        .await;

        let events = client.repo_contributions("core", since()).await.expect("events");

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, EventKind::IssueOpened);
        assert_eq!(events[0].user, "bob");

        let comments: Vec<(&str, Option<u64>, Option<u64>)> = events
            .iter()
            .filter(|e| e.kind == EventKind::Comment)
            .map(|e| (e.user.as_str(), e.issue_number(), e.pr_number()))
            .collect();
        assert_eq!(
            comments,
            vec![
                ("dave", Some(7), None),
                ("erin", None, Some(12)),
                ("erin", None, Some(12)),
            ]
        );
    }

    #[tokio::test]
    async fn test_listing_error_is_reported() {
        let server = MockServer::start().await;
        let client = mock_client(&server);
        Mock::given(method("GET"))
            .and(path("/repos/acme/core/issues"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        assert!(client.repo_contributions("core", since()).await.is_err());
    }
}
