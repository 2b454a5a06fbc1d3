//! Tests for OneDriveClient against a mock Graph server.

use graph_drive::{Error, OneDriveClient, StaticTokenCredential, ROOT_ITEM_ID};
use mockito::{Matcher, Server};
use serde_json::json;

fn client_for(server: &Server) -> OneDriveClient {
    OneDriveClient::builder()
        .credential(StaticTokenCredential::new("test-token"))
        .base_url(server.url())
        .build()
        .unwrap()
}

fn graph_error(code: &str, message: &str) -> String {
    json!({ "error": { "code": code, "message": message } }).to_string()
}

mod discovery {
    use super::*;

    #[tokio::test]
    async fn user_display_name() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer test-token")
            .with_body(json!({ "displayName": "Ada Lovelace" }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_user_display_name().await.unwrap(), "Ada Lovelace");
    }

    #[tokio::test]
    async fn user_display_name_degrades_to_default() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me")
            .with_body(json!({ "id": "u1" }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_user_display_name().await.unwrap(), "User");
    }

    #[tokio::test]
    async fn my_drive_id() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/drive")
            .with_body(json!({ "id": "D1", "name": "OneDrive" }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_my_drive_id().await.unwrap(), "D1");
    }

    #[tokio::test]
    async fn my_drive_id_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/drive")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "no drive"))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_my_drive_id().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn followed_sites_empty() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/followedSites")
            .with_body(json!({ "value": [] }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.list_followed_sites().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn followed_sites_display_name_fallback() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/me/followedSites")
            .with_body(
                json!({
                    "value": [
                        { "id": "s1", "name": "eng", "displayName": "Engineering" },
                        { "id": "s2", "name": "ops" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let sites = client.list_followed_sites().await.unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].display_name, "Engineering");
        assert_eq!(sites[1].display_name, "ops");
    }

    #[tokio::test]
    async fn site_default_drive_by_id() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/sites/S1/drive")
            .with_body(json!({ "id": "D7" }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_site_default_drive_id("S1").await.unwrap(), "D7");
    }

    #[tokio::test]
    async fn site_default_drive_by_id_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/sites/S9/drive")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "no such site"))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_site_default_drive_id("S9").await.unwrap_err();
        assert!(err.to_string().contains("S9"));
    }

    #[tokio::test]
    async fn site_drive_by_hostname_and_path() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/sites/contoso.sharepoint.com:/sites/team")
            .with_body(json!({ "id": "S1", "name": "team" }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/sites/S1/drive")
            .with_body(json!({ "id": "D9" }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let drive_id = client
            .get_site_drive_id("contoso.sharepoint.com", "/sites/team")
            .await
            .unwrap();
        assert_eq!(drive_id, "D9");
    }

    #[tokio::test]
    async fn site_drive_by_hostname_not_found_names_site() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/sites/contoso.sharepoint.com:/sites/gone")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "no such site"))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .get_site_drive_id("contoso.sharepoint.com", "/sites/gone")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("contoso.sharepoint.com:/sites/gone"));
    }
}

mod reading {
    use super::*;

    #[tokio::test]
    async fn get_item_normalizes_metadata() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/item1")
            .with_body(
                json!({
                    "id": "item1",
                    "name": "report.pdf",
                    "size": 2048,
                    "file": { "mimeType": "application/pdf" },
                    "webUrl": "https://contoso-my.sharepoint.com/report.pdf",
                    "@microsoft.graph.downloadUrl": "https://downloads.example/report.pdf"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let item = client.get_item("D1", "item1").await.unwrap();
        assert_eq!(item.name, "report.pdf");
        assert_eq!(item.size, Some(2048));
        assert!(item.is_file());
        assert_eq!(
            item.download_url.as_deref(),
            Some("https://downloads.example/report.pdf")
        );
    }

    #[tokio::test]
    async fn get_item_not_found_names_item() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/missing")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "The resource could not be found."))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_item("D1", "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn list_items_preserves_service_order() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/root/children")
            .with_body(
                json!({
                    "value": [
                        { "id": "f1", "name": "zeta.txt", "file": {} },
                        { "id": "f2", "name": "alpha", "folder": {} }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let items = client.list_items("D1", ROOT_ITEM_ID).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "zeta.txt");
        assert!(items[0].is_file());
        assert_eq!(items[1].name, "alpha");
        assert!(items[1].is_folder);
    }

    #[tokio::test]
    async fn list_items_empty_collection() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/root/children")
            .with_body(json!({ "value": [] }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.list_items("D1", ROOT_ITEM_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_path_matches_list_by_resolved_id() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/root:/Docs/2024:")
            .with_body(json!({ "id": "F42", "name": "2024", "folder": {} }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/drives/D1/items/F42/children")
            .with_body(
                json!({
                    "value": [
                        { "id": "a", "name": "january.xlsx", "file": {} },
                        { "id": "b", "name": "february.xlsx", "file": {} }
                    ]
                })
                .to_string(),
            )
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        let by_path = client.list_items_by_path("D1", "Docs/2024").await.unwrap();
        let by_id = client.list_items("D1", "F42").await.unwrap();
        assert_eq!(by_path, by_id);
    }

    #[tokio::test]
    async fn list_by_path_not_found_names_path() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/root:/Docs/2024:")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "The resource could not be found."))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.list_items_by_path("D1", "Docs/2024").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("Docs/2024"));
    }

    #[tokio::test]
    async fn folder_info_composes_metadata_and_children() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/F1")
            .with_body(
                json!({
                    "id": "F1",
                    "name": "Reports",
                    "folder": { "childCount": 1 },
                    "webUrl": "https://contoso.sharepoint.com/Reports"
                })
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/drives/D1/items/F1/children")
            .with_body(
                json!({ "value": [ { "id": "c1", "name": "q1.pdf", "file": {} } ] }).to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let folder = client.get_folder_info("D1", "F1").await.unwrap();
        assert_eq!(folder.id, "F1");
        assert_eq!(folder.name, "Reports");
        assert_eq!(folder.web_url.as_deref(), Some("https://contoso.sharepoint.com/Reports"));
        assert_eq!(folder.children.len(), 1);
        assert_eq!(folder.children[0].name, "q1.pdf");
    }
}

mod downloads {
    use super::*;

    #[tokio::test]
    async fn download_into_directory_keeps_remote_name() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/X")
            .with_body(json!({ "id": "X", "name": "report.pdf", "file": {} }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/drives/D1/items/X/content")
            .with_body("pdf-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server);
        let path = client.download_file("D1", "X", dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("report.pdf"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pdf-bytes");
    }

    #[tokio::test]
    async fn download_creates_missing_parent_directories() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/X/content")
            .with_body("nested")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("a/b/out.bin");
        let client = client_for(&server);
        let path = client.download_file("D1", "X", &destination).await.unwrap();

        assert_eq!(path, destination);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn download_missing_content_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/X/content")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "gone"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server);
        let err = client
            .download_file("D1", "X", dir.path().join("out.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("X"));
    }
}

mod writes {
    use super::*;

    #[tokio::test]
    async fn upload_puts_content_with_rename_policy() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/drives/D1/items/root:/a.txt:/content")
            .match_query(Matcher::UrlEncoded(
                "@microsoft.graph.conflictBehavior".into(),
                "rename".into(),
            ))
            .match_header("authorization", "Bearer test-token")
            .match_header("content-type", "text/plain")
            .match_body("hi")
            .with_status(201)
            .with_body(
                json!({ "id": "N1", "name": "a.txt", "size": 2, "file": {} }).to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let item = client
            .upload_file("D1", ROOT_ITEM_ID, "a.txt", b"hi".to_vec())
            .await
            .unwrap();
        assert_eq!(item.name, "a.txt");
        assert_eq!(item.size, Some(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upload_conflict_is_renamed_not_rejected() {
        let mut server = Server::new_async().await;
        // The service resolves the collision; the client only sees the
        // renamed metadata.
        server
            .mock("PUT", "/drives/D1/items/root:/a.txt:/content")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body(json!({ "id": "N2", "name": "a 1.txt", "size": 2, "file": {} }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let item = client
            .upload_file("D1", ROOT_ITEM_ID, "a.txt", b"hi".to_vec())
            .await
            .unwrap();
        assert_ne!(item.name, "a.txt");
        assert_eq!(item.id, "N2");
    }

    #[tokio::test]
    async fn upload_by_path() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/drives/D1/items/root:/Docs/b.txt:/content")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body(json!({ "id": "N3", "name": "b.txt", "file": {} }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let item = client
            .upload_file_by_path("D1", "Docs/b.txt", b"content".to_vec())
            .await
            .unwrap();
        assert_eq!(item.id, "N3");
    }

    #[tokio::test]
    async fn upload_without_metadata_is_operation_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/drives/D1/items/root:/a.txt:/content")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .upload_file("D1", ROOT_ITEM_ID, "a.txt", b"hi".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed(_)));
        assert!(err.to_string().contains("a.txt"));
    }

    #[tokio::test]
    async fn create_folder_posts_rename_policy() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/drives/D1/items/root/children")
            .match_body(Matcher::Json(json!({
                "name": "New Folder",
                "folder": {},
                "@microsoft.graph.conflictBehavior": "rename"
            })))
            .with_status(201)
            .with_body(
                json!({ "id": "F9", "name": "New Folder", "folder": { "childCount": 0 } })
                    .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let folder = client
            .create_folder("D1", ROOT_ITEM_ID, "New Folder")
            .await
            .unwrap();
        assert!(folder.is_folder);
        assert_eq!(folder.id, "F9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_folder_without_metadata_is_operation_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/drives/D1/items/root/children")
            .with_status(201)
            .with_body("")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_folder("D1", ROOT_ITEM_ID, "New Folder")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed(_)));
    }

    #[tokio::test]
    async fn delete_item_succeeds() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/drives/D1/items/X")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        client.delete_item("D1", "X").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_missing_item_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/drives/D1/items/gone")
            .with_status(404)
            .with_body(graph_error("itemNotFound", "nope"))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.delete_item("D1", "gone").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("gone"));
    }
}

mod error_handling {
    use super::*;

    #[tokio::test]
    async fn graph_error_body_surfaces_status_and_message() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/item1")
            .with_status(503)
            .with_body(graph_error("serviceNotAvailable", "try again later"))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_item("D1", "item1").await.unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "try again later");
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_is_passed_through() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/drives/D1/items/item1")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_item("D1", "item1").await.unwrap_err();
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("bad gateway"));
    }
}

mod singleton {
    use graph_drive::shared_client;

    #[test]
    fn factory_memoizes_one_instance() {
        // Missing configuration fails fast and is not memoized.
        std::env::remove_var("AZURE_TENANT_ID");
        std::env::remove_var("AZURE_CLIENT_ID");
        assert!(shared_client().is_err());

        std::env::set_var("AZURE_TENANT_ID", "tenant-guid");
        std::env::set_var("AZURE_CLIENT_ID", "client-guid");
        let first = shared_client().unwrap();
        let second = shared_client().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
