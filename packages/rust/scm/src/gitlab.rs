//! GitLab REST v4 implementation of [`ScmClient`].

use bundleworks_shared::{BundleworksError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{ScmBranch, ScmClient, ScmProject};

/// Default timeout in seconds for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("bundleworks/", env!("CARGO_PKG_VERSION"));

/// GitLab REST v4 client authenticated with a private token.
pub struct GitlabClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl GitlabClient {
    pub fn new(base_url: Url, token: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BundleworksError::Scm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                BundleworksError::Scm(format!("base URL cannot be a base: {}", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(["api", "v4"]);
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "scm api request");

        let response = self
            .http
            .get(url.clone())
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| BundleworksError::Scm(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BundleworksError::Scm(format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BundleworksError::Scm(format!("{url}: invalid response body: {e}")))
    }
}

impl ScmClient for GitlabClient {
    async fn get_branch(&self, project_id: &str, branch: &str) -> Result<ScmBranch> {
        let url = self.api_url(&[
            "projects",
            project_id,
            "repository",
            "branches",
            branch,
        ])?;
        let body: BranchResponse = self.get_json(url).await?;

        Ok(ScmBranch {
            commit_id: body.commit.id,
            short_commit_id: body.commit.short_id,
        })
    }

    async fn get_project(&self, project_id: &str) -> Result<ScmProject> {
        let url = self.api_url(&["projects", project_id])?;
        let body: ProjectResponse = self.get_json(url).await?;

        Ok(ScmProject {
            namespace_path: body.namespace.full_path,
            name: body.path,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    id: String,
    short_id: String,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    /// URL path component of the project (not the display name).
    path: String,
    namespace: NamespaceResponse,
}

#[derive(Debug, Deserialize)]
struct NamespaceResponse {
    full_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_client(server: &MockServer) -> GitlabClient {
        GitlabClient::new(Url::parse(&server.uri()).unwrap(), "test-token".into()).unwrap()
    }

    #[tokio::test]
    async fn get_branch_parses_commit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/repository/branches/main"))
            .and(header("PRIVATE-TOKEN", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "name": "main",
                    "commit": {
                        "id": "abc123def456abc123def456abc123def456abcd",
                        "short_id": "abc123de"
                    }
                }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let branch = client.get_branch("42", "main").await.expect("get branch");

        assert_eq!(branch.short_commit_id, "abc123de");
        assert!(branch.commit_id.starts_with("abc123de"));
    }

    #[tokio::test]
    async fn branch_name_is_path_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/repository/branches/feature%2Fnew-ui"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"name": "feature/new-ui", "commit": {"id": "ff00aa11", "short_id": "ff00aa"}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let branch = client
            .get_branch("42", "feature/new-ui")
            .await
            .expect("get branch");
        assert_eq!(branch.short_commit_id, "ff00aa");
    }

    #[tokio::test]
    async fn get_project_parses_namespace() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "name": "Checkout Widget",
                    "path": "checkout-widget",
                    "namespace": {"full_path": "frontend/widgets"}
                }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let project = client.get_project("42").await.expect("get project");

        assert_eq!(project.namespace_path, "frontend/widgets");
        assert_eq!(project.name, "checkout-widget");
    }

    #[tokio::test]
    async fn api_error_surfaces_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/projects/42/repository/branches/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let result = client.get_branch("42", "gone").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("404"));
    }
}
