use std::io::{Cursor, Read};

use serde_json::json;
use zip::ZipArchive;

use crate::common::{TestApp, routes};

/// Admin-seeded app with merchant "shop" and customer "alice", both logged
/// in. Returns (app, merchant_id, merchant_token, customer_id, customer_token).
async fn setup() -> (TestApp, i32, String, i32, String) {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (merchant_id, merchant) = app.create_user(&admin, "shop", "merchant").await;
    let (customer_id, customer) = app.create_user(&admin, "alice", "customer").await;
    (app, merchant_id, merchant, customer_id, customer)
}

async fn read_zip(res: reqwest::Response) -> ZipArchive<Cursor<Vec<u8>>> {
    let bytes = res.bytes().await.expect("Failed to read response body");
    ZipArchive::new(Cursor::new(bytes.to_vec())).expect("Response should be a valid zip archive")
}

fn entry_names(archive: &ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn entry_bytes(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
    let mut entry = archive.by_name(name).expect("Archive entry should exist");
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).expect("Archive entry should be readable");
    buf
}

/// Fetch the download ledger through the admin API.
async fn download_records(app: &TestApp, query: &str) -> serde_json::Value {
    let admin = app.admin_token().await;
    let res = app
        .get_with_token(&format!("{}{query}", routes::DOWNLOAD_RECORDS), &admin)
        .await;
    assert_eq!(res.status, 200, "ledger fetch failed: {}", res.text);
    res.body
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn shows_received_files_with_owner_and_download_state() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(res.status, 200, "listing failed: {}", res.text);
        let item = &res.body["items"][0];
        assert_eq!(item["id"].as_i64().unwrap() as i32, id);
        assert_eq!(item["owner_username"], "alice");
        assert_eq!(item["original_name"], "a.jpg");
        assert!(item["download_status"].is_null());
        assert!(item["download_time"].is_null());

        let res = app.download_raw(&routes::download(id), &merchant).await;
        assert_eq!(res.status().as_u16(), 200);

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        let item = &res.body["items"][0];
        assert_eq!(item["download_status"], "success");
        assert!(item["download_time"].is_string());
    }

    #[tokio::test]
    async fn customer_id_filter_narrows_the_listing() {
        let (app, merchant_id, merchant, customer_id, customer) = setup().await;
        let admin = app.admin_token().await;
        let (_, bob) = app.create_user(&admin, "bob", "customer").await;
        app.upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;
        app.upload_one(&bob, merchant_id, "b.jpg", "image/jpeg", b"B")
            .await;

        let res = app
            .get_with_token(
                &format!("{}?customer_id={customer_id}", routes::MERCHANT_PHOTOS),
                &merchant,
            )
            .await;

        let items = res.body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["original_name"], "a.jpg");
    }

    #[tokio::test]
    async fn other_merchants_files_stay_invisible() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let admin = app.admin_token().await;
        let (rival_id, rival) = app.create_user(&admin, "rival", "merchant").await;
        app.upload_one(&customer, merchant_id, "mine.jpg", "image/jpeg", b"A")
            .await;
        app.upload_one(&customer, rival_id, "theirs.jpg", "image/jpeg", b"B")
            .await;

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(res.body["pagination"]["total"].as_u64().unwrap(), 1);
        assert_eq!(res.body["items"][0]["original_name"], "mine.jpg");

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &rival).await;
        assert_eq!(res.body["items"][0]["original_name"], "theirs.jpg");
    }

    #[tokio::test]
    async fn soft_deleted_files_are_hidden_until_restored() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app.delete_with_token(&routes::photo(id), &customer).await;
        assert_eq!(res.status, 204, "delete failed: {}", res.text);

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(res.body["pagination"]["total"].as_u64().unwrap(), 0);

        let res = app
            .post_with_token(&routes::photo_restore(id), &json!({}), &customer)
            .await;
        assert_eq!(res.status, 204, "restore failed: {}", res.text);

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(res.body["pagination"]["total"].as_u64().unwrap(), 1);
    }

    #[tokio::test]
    async fn process_status_filter_narrows_the_listing() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let shipped_id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;
        app.upload_one(&customer, merchant_id, "b.jpg", "image/jpeg", b"B")
            .await;

        let res = app
            .put_with_token(
                &routes::process_status(shipped_id),
                &json!({"process_status": "shipped"}),
                &merchant,
            )
            .await;
        assert_eq!(res.status, 204, "status change failed: {}", res.text);

        let res = app
            .get_with_token(
                &format!("{}?status=shipped", routes::MERCHANT_PHOTOS),
                &merchant,
            )
            .await;
        let items = res.body["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"].as_i64().unwrap() as i32, shipped_id);
    }

    #[tokio::test]
    async fn customers_cannot_use_the_merchant_listing() {
        let (app, _merchant_id, _merchant, _customer_id, customer) = setup().await;

        let res = app.get_with_token(routes::MERCHANT_PHOTOS, &customer).await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }
}

mod process_status {
    use super::*;

    #[tokio::test]
    async fn transitions_are_free_form() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app
            .put_with_token(
                &routes::process_status(id),
                &json!({"process_status": "shipped"}),
                &merchant,
            )
            .await;
        assert_eq!(res.status, 204, "status change failed: {}", res.text);

        let list = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(list.body["items"][0]["process_status"], "shipped");

        // Back to an earlier stage is allowed.
        let res = app
            .put_with_token(
                &routes::process_status(id),
                &json!({"process_status": "received"}),
                &merchant,
            )
            .await;
        assert_eq!(res.status, 204, "status change failed: {}", res.text);

        let list = app.get_with_token(routes::MERCHANT_PHOTOS, &merchant).await;
        assert_eq!(list.body["items"][0]["process_status"], "received");
    }

    #[tokio::test]
    async fn unknown_status_values_are_rejected() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app
            .put_with_token(
                &routes::process_status(id),
                &json!({"process_status": "lost"}),
                &merchant,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn other_merchants_files_are_404() {
        let (app, merchant_id, _merchant, _customer_id, customer) = setup().await;
        let admin = app.admin_token().await;
        let (_, rival) = app.create_user(&admin, "rival", "merchant").await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app
            .put_with_token(
                &routes::process_status(id),
                &json!({"process_status": "shipped"}),
                &rival,
            )
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn deleted_files_cannot_change_status() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;
        let res = app.delete_with_token(&routes::photo(id), &customer).await;
        assert_eq!(res.status, 204, "delete failed: {}", res.text);

        let res = app
            .put_with_token(
                &routes::process_status(id),
                &json!({"process_status": "shipped"}),
                &merchant,
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "CONFLICT");
        assert!(res.body["message"].as_str().unwrap().contains("deleted"));
    }
}

mod single_download {
    use super::*;

    #[tokio::test]
    async fn streams_the_bytes_with_download_headers() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"JPEGDATA")
            .await;

        let res = app.download_raw(&routes::download(id), &merchant).await;

        assert_eq!(res.status().as_u16(), 200);
        let headers = res.headers().clone();
        assert_eq!(headers["content-type"], "image/jpeg");
        assert_eq!(headers["content-length"], "8");
        assert!(
            headers["content-disposition"]
                .to_str()
                .unwrap()
                .contains("filename=\"a.jpg\"")
        );
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"JPEGDATA");
    }

    #[tokio::test]
    async fn success_is_recorded_in_the_ledger() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app.download_raw(&routes::download(id), &merchant).await;
        assert_eq!(res.status().as_u16(), 200);

        let body = download_records(&app, "").await;
        assert_eq!(body["pagination"]["total"].as_u64().unwrap(), 1);
        let row = &body["items"][0];
        assert_eq!(row["file_id"].as_i64().unwrap() as i32, id);
        assert_eq!(row["original_name"], "a.jpg");
        assert_eq!(row["merchant_username"], "shop");
        assert_eq!(row["download_type"], "single");
        assert_eq!(row["status"], "success");
        assert!(row["archive_path"].is_null());
        assert!(row["error_message"].is_null());
    }

    #[tokio::test]
    async fn missing_bytes_return_404_and_a_failed_row() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;
        app.remove_stored_file(id).await;

        let res = app.download_raw(&routes::download(id), &merchant).await;
        assert_eq!(res.status().as_u16(), 404);

        let body = download_records(&app, "").await;
        let row = &body["items"][0];
        assert_eq!(row["status"], "failed");
        assert_eq!(row["download_type"], "single");
        assert!(row["error_message"].is_string());
    }

    #[tokio::test]
    async fn other_merchants_files_are_404_without_a_ledger_row() {
        let (app, merchant_id, _merchant, _customer_id, customer) = setup().await;
        let admin = app.admin_token().await;
        let (_, rival) = app.create_user(&admin, "rival", "merchant").await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app.download_raw(&routes::download(id), &rival).await;
        assert_eq!(res.status().as_u16(), 404);

        let body = download_records(&app, "").await;
        assert_eq!(body["pagination"]["total"].as_u64().unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_files_are_not_downloadable() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;
        let res = app.delete_with_token(&routes::photo(id), &customer).await;
        assert_eq!(res.status, 204, "delete failed: {}", res.text);

        let res = app.download_raw(&routes::download(id), &merchant).await;

        assert_eq!(res.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn query_token_authenticates_the_request() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let id = app
            .upload_one(&customer, merchant_id, "a.jpg", "image/jpeg", b"A")
            .await;

        let res = app
            .client
            .get(format!(
                "http://{}{}?token={merchant}",
                app.addr,
                routes::download(id)
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);

        let res = app
            .client
            .get(format!(
                "http://{}{}?token=not-a-jwt",
                app.addr,
                routes::download(id)
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 401);
    }
}

mod batch_download {
    use super::*;

    #[tokio::test]
    async fn zips_the_selected_files() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("a.jpg", "image/jpeg", b"AAA".as_slice()),
                    ("b.jpg", "image/jpeg", b"BBBB".as_slice()),
                    ("c.png", "image/png", b"CCCCC".as_slice()),
                ],
                None,
            )
            .await;
        assert_eq!(res.status, 201, "upload failed: {}", res.text);
        let ids: Vec<i64> = res.body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_i64().unwrap())
            .collect();

        let res = app
            .download_raw(
                &format!(
                    "{}?ids={},{},{}",
                    routes::BATCH_DOWNLOAD,
                    ids[0],
                    ids[1],
                    ids[2]
                ),
                &merchant,
            )
            .await;

        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers()["content-type"], "application/zip");
        let disposition = res.headers()["content-disposition"].to_str().unwrap().to_string();
        assert!(disposition.contains("photos-"));
        assert!(disposition.contains(".zip"));

        let mut archive = read_zip(res).await;
        assert_eq!(entry_names(&archive), vec!["a.jpg", "b.jpg", "c.png"]);
        assert_eq!(entry_bytes(&mut archive, "a.jpg"), b"AAA");
        assert_eq!(entry_bytes(&mut archive, "c.png"), b"CCCCC");

        let body = download_records(&app, "").await;
        let rows = body["items"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r["download_type"] == "batch"));
        assert!(rows.iter().all(|r| r["status"] == "success"));
        assert!(rows.iter().all(|r| r["archive_path"].is_string()));
    }

    #[tokio::test]
    async fn archives_are_kept_on_disk_for_auditing() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("a.jpg", "image/jpeg", b"A".as_slice()),
                    ("b.jpg", "image/jpeg", b"B".as_slice()),
                ],
                None,
            )
            .await;
        let ids: Vec<i64> = res.body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_i64().unwrap())
            .collect();

        let res = app
            .download_raw(
                &format!("{}?ids={},{}", routes::BATCH_DOWNLOAD, ids[0], ids[1]),
                &merchant,
            )
            .await;
        assert_eq!(res.status().as_u16(), 200);

        let body = download_records(&app, "").await;
        let archive_path = body["items"][0]["archive_path"].as_str().unwrap();
        assert!(std::path::Path::new(archive_path).exists());
    }

    #[tokio::test]
    async fn whole_customer_batch_bundles_only_active_files() {
        let (app, merchant_id, merchant, customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("a.jpg", "image/jpeg", b"A".as_slice()),
                    ("b.jpg", "image/jpeg", b"B".as_slice()),
                    ("c.jpg", "image/jpeg", b"C".as_slice()),
                ],
                None,
            )
            .await;
        let deleted_id = res.body["files"][2]["id"].as_i64().unwrap() as i32;
        let res = app
            .delete_with_token(&routes::photo(deleted_id), &customer)
            .await;
        assert_eq!(res.status, 204, "delete failed: {}", res.text);

        let res = app
            .download_raw(&routes::customer_download(customer_id), &merchant)
            .await;

        assert_eq!(res.status().as_u16(), 200);
        let archive = read_zip(res).await;
        assert_eq!(entry_names(&archive), vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn missing_members_are_skipped_and_logged() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("a.jpg", "image/jpeg", b"A".as_slice()),
                    ("b.jpg", "image/jpeg", b"B".as_slice()),
                    ("c.jpg", "image/jpeg", b"C".as_slice()),
                ],
                None,
            )
            .await;
        let ids: Vec<i64> = res.body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_i64().unwrap())
            .collect();
        app.remove_stored_file(ids[1] as i32).await;

        let res = app
            .download_raw(
                &format!(
                    "{}?ids={},{},{}",
                    routes::BATCH_DOWNLOAD,
                    ids[0],
                    ids[1],
                    ids[2]
                ),
                &merchant,
            )
            .await;

        assert_eq!(res.status().as_u16(), 200);
        let archive = read_zip(res).await;
        assert_eq!(entry_names(&archive), vec!["a.jpg", "c.jpg"]);

        let body = download_records(&app, &format!("?file_id={}", ids[1])).await;
        let row = &body["items"][0];
        assert_eq!(row["status"], "failed");
        assert!(row["error_message"].is_string());
        assert!(row["archive_path"].is_null());

        let body = download_records(&app, "").await;
        let rows = body["items"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        let successes = rows.iter().filter(|r| r["status"] == "success").count();
        assert_eq!(successes, 2);
    }

    #[tokio::test]
    async fn fully_missing_batch_is_404() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("a.jpg", "image/jpeg", b"A".as_slice()),
                    ("b.jpg", "image/jpeg", b"B".as_slice()),
                ],
                None,
            )
            .await;
        let ids: Vec<i64> = res.body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_i64().unwrap())
            .collect();
        app.remove_stored_file(ids[0] as i32).await;
        app.remove_stored_file(ids[1] as i32).await;

        let res = app
            .download_raw(
                &format!("{}?ids={},{}", routes::BATCH_DOWNLOAD, ids[0], ids[1]),
                &merchant,
            )
            .await;

        assert_eq!(res.status().as_u16(), 404);

        let body = download_records(&app, "").await;
        let rows = body["items"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["status"] == "failed"));
    }

    #[tokio::test]
    async fn single_survivor_streams_directly() {
        let (app, merchant_id, merchant, _customer_id, customer) = setup().await;
        let res = app
            .upload(
                &customer,
                merchant_id,
                &[
                    ("keep.jpg", "image/jpeg", b"KEEP".as_slice()),
                    ("gone.jpg", "image/jpeg", b"GONE".as_slice()),
                ],
                None,
            )
            .await;
        let keep_id = res.body["files"][0]["id"].as_i64().unwrap();
        let gone_id = res.body["files"][1]["id"].as_i64().unwrap() as i32;
        let res = app
            .delete_with_token(&routes::photo(gone_id), &customer)
            .await;
        assert_eq!(res.status, 204, "delete failed: {}", res.text);

        let res = app
            .download_raw(
                &format!("{}?ids={keep_id},{gone_id}", routes::BATCH_DOWNLOAD),
                &merchant,
            )
            .await;

        // One downloadable file left: streamed as-is instead of zipped.
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers()["content-type"], "image/jpeg");
        assert_eq!(res.bytes().await.unwrap().as_ref(), b"KEEP");

        let body = download_records(&app, "").await;
        assert_eq!(body["pagination"]["total"].as_u64().unwrap(), 1);
        let row = &body["items"][0];
        assert_eq!(row["download_type"], "batch");
        assert!(row["archive_path"].is_null());
    }

    #[tokio::test]
    async fn malformed_id_lists_are_rejected() {
        let (app, _merchant_id, merchant, _customer_id, _customer) = setup().await;

        let res = app
            .download_raw(&format!("{}?ids=abc", routes::BATCH_DOWNLOAD), &merchant)
            .await;

        assert_eq!(res.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn selection_without_downloadable_files_is_404() {
        let (app, _merchant_id, merchant, _customer_id, _customer) = setup().await;

        let res = app
            .download_raw(
                &format!("{}?ids=9998,9999", routes::BATCH_DOWNLOAD),
                &merchant,
            )
            .await;

        assert_eq!(res.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn empty_customer_batch_is_404() {
        let (app, _merchant_id, merchant, customer_id, _customer) = setup().await;

        let res = app
            .download_raw(&routes::customer_download(customer_id), &merchant)
            .await;

        assert_eq!(res.status().as_u16(), 404);
    }
}
