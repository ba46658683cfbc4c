//! Session establishment against a mock course site.

use std::path::Path;

use language101::auth::establish_session;
use language101::{Credentials, LocalFiles, PipelineError, RunConfig};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LESSON_PATH: &str = "/lesson/first/";
const LOGIN_PATH: &str = "/member/login_new.php";

fn run_config(server: &MockServer, dir: &Path) -> RunConfig {
    RunConfig::new(
        Credentials {
            username: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        },
        &format!("{}{LESSON_PATH}?lp=42", server.uri()),
        LocalFiles {
            cookies: dir.join("cookies.txt"),
            user_agent: dir.join("ua.txt"),
            output_root: dir.join("downloads"),
        },
    )
    .unwrap()
}

fn write_user_agent(dir: &Path) {
    std::fs::write(dir.join("ua.txt"), "Mozilla/5.0 (test)\n").unwrap();
}

fn write_saved_cookie(dir: &Path, value: &str) {
    std::fs::write(
        dir.join("cookies.txt"),
        format!("# Netscape HTTP Cookie File\n127.0.0.1\tFALSE\t/\tFALSE\t0\tsid\t{value}\n"),
    )
    .unwrap();
}

#[tokio::test]
async fn test_valid_cookies_are_reused_without_login() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());
    write_saved_cookie(temp.path(), "saved");

    Mock::given(method("GET"))
        .and(path(LESSON_PATH))
        .and(header("cookie", "sid=saved"))
        .and(header("user-agent", "Mozilla/5.0 (test)"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><a href=\"/logout\">Log Out</a></body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    establish_session(&config).await.unwrap();
}

#[tokio::test]
async fn test_sign_in_control_forces_fresh_login() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());
    write_saved_cookie(temp.path(), "stale");

    Mock::given(method("GET"))
        .and(path(LESSON_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><button>Sign In</button></body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_string_contains("amember_login=me%40example.com"))
        .and(body_string_contains("amember_pass=hunter2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=fresh; Path=/")
                .set_body_string("<html><body>Welcome back</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    establish_session(&config).await.unwrap();

    let saved = std::fs::read_to_string(temp.path().join("cookies.txt")).unwrap();
    assert!(saved.starts_with("# Netscape HTTP Cookie File"));
    assert!(saved.contains("\tsid\tfresh"), "cookie file: {saved}");
    assert!(!saved.contains("stale"));
}

#[tokio::test]
async fn test_missing_cookie_file_logs_in_directly() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=new"))
        .expect(1)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    establish_session(&config).await.unwrap();
    assert!(temp.path().join("cookies.txt").exists());
}

#[tokio::test]
async fn test_missing_user_agent_fails_before_any_request() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_saved_cookie(temp.path(), "saved");

    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    let err = establish_session(&config).await.err().unwrap();
    assert!(matches!(err, PipelineError::ConfigMissing { .. }), "{err}");
}

#[tokio::test]
async fn test_rejected_login_is_http_error() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    let err = establish_session(&config).await.err().unwrap();
    assert!(
        matches!(err, PipelineError::HttpError { status: 403, .. }),
        "{err}"
    );
    assert!(!temp.path().join("cookies.txt").exists());
}

#[tokio::test]
async fn test_captcha_on_login_aborts() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Please solve the captcha</body></html>"),
        )
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    let err = establish_session(&config).await.err().unwrap();
    assert!(err.is_captcha(), "{err}");
}

#[tokio::test]
async fn test_probe_server_error_is_fatal() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());
    write_saved_cookie(temp.path(), "saved");

    Mock::given(method("GET"))
        .and(path(LESSON_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    let err = establish_session(&config).await.err().unwrap();
    assert!(
        matches!(err, PipelineError::HttpError { status: 500, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_unreachable_course_page_falls_back_to_login() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());
    write_saved_cookie(temp.path(), "saved");

    // Nothing listens on this port once the listener is dropped.
    let closed_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    Mock::given(method("GET"))
        .and(path(LESSON_PATH))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("http://127.0.0.1:{closed_port}/gone")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    establish_session(&config).await.unwrap();

    let saved = std::fs::read_to_string(temp.path().join("cookies.txt")).unwrap();
    assert!(saved.contains("\tsid\tfresh"), "cookie file: {saved}");
}

#[tokio::test]
async fn test_unreadable_cookie_file_logs_in_directly() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    write_user_agent(temp.path());
    std::fs::write(temp.path().join("cookies.txt"), "garbage\n").unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=new"))
        .expect(1)
        .mount(&server)
        .await;

    let config = run_config(&server, temp.path());
    establish_session(&config).await.unwrap();

    let saved = std::fs::read_to_string(temp.path().join("cookies.txt")).unwrap();
    assert!(saved.contains("\tsid\tnew"), "cookie file: {saved}");
    assert!(!saved.contains("garbage"));
}
