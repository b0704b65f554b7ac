use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::storage::FilesystemAssetStore;
use reqwest::Client;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use tempfile::TempDir;

use server::audit::AuditLogger;
use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, ServerConfig, StorageConfig,
};
use server::entity::{file_asset, operation_log};
use server::state::AppState;

/// Password given to every account the test helpers create.
pub const PASSWORD: &str = "pass12345";

/// Password the bootstrap admin account is seeded with.
pub const BOOTSTRAP_PASSWORD: &str = "bootstrap-pass";

pub mod routes {
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";

    pub const PHOTOS: &str = "/api/v1/photos";
    pub const DUPLICATE_CHECK: &str = "/api/v1/photos/duplicate-check";
    pub const MY_PHOTOS: &str = "/api/v1/photos/mine";

    pub fn photo(id: i32) -> String {
        format!("/api/v1/photos/{id}")
    }

    pub fn photo_restore(id: i32) -> String {
        format!("/api/v1/photos/{id}/restore")
    }

    pub fn photo_remarks(id: i32) -> String {
        format!("/api/v1/photos/{id}/remarks")
    }

    pub const MERCHANT_PHOTOS: &str = "/api/v1/merchant/photos";
    pub const BATCH_DOWNLOAD: &str = "/api/v1/merchant/photos/download";

    pub fn process_status(id: i32) -> String {
        format!("/api/v1/merchant/photos/{id}/process-status")
    }

    pub fn download(id: i32) -> String {
        format!("/api/v1/merchant/photos/{id}/download")
    }

    pub fn customer_download(customer_id: i32) -> String {
        format!("/api/v1/merchant/customers/{customer_id}/download")
    }

    pub const ADMIN_PHOTOS: &str = "/api/v1/admin/photos";
    pub const ADMIN_USERS: &str = "/api/v1/admin/users";
    pub const OPERATION_LOGS: &str = "/api/v1/admin/operation-logs";
    pub const DOWNLOAD_RECORDS: &str = "/api/v1/admin/download-records";

    pub fn user_status(id: i32) -> String {
        format!("/api/v1/admin/users/{id}/status")
    }

    pub fn user_password(id: i32) -> String {
        format!("/api/v1/admin/users/{id}/password")
    }
}

/// A running test server backed by a throwaway SQLite file and upload
/// directory, both removed when the app is dropped.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub upload_dir: PathBuf,
    _root: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let db_path = root.path().join("photodrop.db");
        let upload_dir = root.path().join("uploads");

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: format!("sqlite://{}?mode=rwc", db_path.display()),
            },
            auth: AuthConfig {
                jwt_secret: "test-secret-for-integration-tests".to_string(),
                bootstrap_password: BOOTSTRAP_PASSWORD.to_string(),
            },
            storage: StorageConfig {
                upload_dir: upload_dir.to_string_lossy().into_owned(),
            },
        };

        let db = server::database::init_db(&config.database)
            .await
            .expect("Failed to initialize test database");
        server::seed::seed_bootstrap_admin(&db, &config)
            .await
            .expect("Failed to seed bootstrap admin");
        server::seed::ensure_indexes(&db)
            .await
            .expect("Failed to create indexes");

        let store = FilesystemAssetStore::new(upload_dir.clone())
            .await
            .expect("Failed to prepare upload directory");

        let state = AppState {
            db: db.clone(),
            config,
            files: Arc::new(store),
            audit: AuditLogger::new(db.clone()),
        };
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            upload_dir,
            _root: root,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// GET returning the raw response, for byte and header assertions.
    pub async fn download_raw(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    /// Log in and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let res = self
            .post_without_token(
                routes::LOGIN,
                &serde_json::json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);

        res.body["token"]
            .as_str()
            .expect("Login response should contain a token")
            .to_string()
    }

    /// Token for the seeded bootstrap admin account.
    pub async fn admin_token(&self) -> String {
        self.login("admin", BOOTSTRAP_PASSWORD).await
    }

    /// Create an account through the admin API. Returns its id.
    pub async fn create_account(&self, admin_token: &str, username: &str, role: &str) -> i32 {
        let res = self
            .post_with_token(
                routes::ADMIN_USERS,
                &serde_json::json!({
                    "username": username,
                    "password": PASSWORD,
                    "role": role,
                }),
                admin_token,
            )
            .await;
        assert_eq!(res.status, 201, "create_account failed: {}", res.text);
        res.id()
    }

    /// Create an account and log into it. Returns `(id, token)`.
    pub async fn create_user(&self, admin_token: &str, username: &str, role: &str) -> (i32, String) {
        let id = self.create_account(admin_token, username, role).await;
        let token = self.login(username, PASSWORD).await;
        (id, token)
    }

    /// Send a multipart upload. `files` entries are `(name, MIME type, bytes)`.
    pub async fn upload(
        &self,
        token: &str,
        merchant_id: i32,
        files: &[(&str, &str, &[u8])],
        remarks: Option<&str>,
    ) -> TestResponse {
        let mut form = reqwest::multipart::Form::new().text("merchant_id", merchant_id.to_string());
        if let Some(remarks) = remarks {
            form = form.text("remarks", remarks.to_string());
        }
        for (name, mime, bytes) in files {
            let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                .file_name(name.to_string())
                .mime_str(mime)
                .expect("Failed to set MIME type");
            form = form.part("files", part);
        }

        let res = self
            .client
            .post(self.url(routes::PHOTOS))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Upload a single file and return its id.
    pub async fn upload_one(
        &self,
        token: &str,
        merchant_id: i32,
        name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> i32 {
        let res = self.upload(token, merchant_id, &[(name, mime, bytes)], None).await;
        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        res.body["files"][0]["id"]
            .as_i64()
            .expect("upload response should contain file ids") as i32
    }

    /// On-disk name of a stored file.
    pub async fn stored_name_of(&self, file_id: i32) -> String {
        file_asset::Entity::find_by_id(file_id)
            .one(&self.db)
            .await
            .expect("DB query failed")
            .expect("File row not found")
            .stored_name
    }

    /// Delete a file's bytes from the store, leaving its row in place.
    pub async fn remove_stored_file(&self, file_id: i32) {
        let name = self.stored_name_of(file_id).await;
        std::fs::remove_file(self.upload_dir.join(&name)).expect("Failed to remove stored file");
    }

    /// Block until at least `want` operation log rows with `op_code` exist.
    /// Log writes are fire-and-forget, so tests poll instead of racing them.
    pub async fn wait_for_log(&self, op_code: &str, want: u64) {
        for _ in 0..100 {
            let count = operation_log::Entity::find()
                .filter(operation_log::Column::OpCode.eq(op_code))
                .count(&self.db)
                .await
                .expect("DB query failed");
            if count >= want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Timed out waiting for {want} '{op_code}' operation log entries");
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn id(&self) -> i32 {
        self.body["id"]
            .as_i64()
            .expect("response body should contain 'id'") as i32
    }
}
