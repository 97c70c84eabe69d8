// src/repository/mod.rs

//! Repository management and mirror selection
//!
//! This module provides functionality for:
//! - Managing remote index repositories and their mirror lists
//! - Ordering mirrors so the canonical address is tried first
//! - Seeding a fresh database with the bundled default repositories

mod bootstrap;
mod management;
mod mirror;

pub use bootstrap::{
    DEFAULT_REPOSITORIES, DefaultRepository, MirrorSeed, parse_default_repositories,
    seed_bundled_repositories, seed_default_repositories,
};
pub use management::{
    add_repository, add_user_mirror, parse_fingerprint, remove_repository, remove_user_mirror,
    set_mirror_enabled, set_repository_enabled,
};
pub use mirror::{Mirror, effective_mirrors, order_mirrors, same_base};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Repository;
    use crate::db::schema;
    use crate::error::Error;
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_add_repository() {
        let (_temp, conn) = create_test_db();

        let repo = add_repository(
            &conn,
            "main".to_string(),
            "https://repo.example.org/repo".to_string(),
            true,
            10,
        )
        .unwrap();
        assert!(repo.id.is_some());
        assert!(repo.certificate.is_none());

        let dup = add_repository(
            &conn,
            "main".to_string(),
            "https://other.example.org/repo".to_string(),
            true,
            0,
        );
        assert!(matches!(dup, Err(Error::ConflictError(_))));

        let same_address = add_repository(
            &conn,
            "alias".to_string(),
            "https://repo.example.org/repo/".to_string(),
            true,
            0,
        );
        assert!(matches!(same_address, Err(Error::ConflictError(_))));
    }

    #[test]
    fn test_add_repository_rejects_bad_url() {
        let (_temp, conn) = create_test_db();
        let result = add_repository(&conn, "x".to_string(), "ftp://x/repo".to_string(), true, 0);
        assert!(matches!(result, Err(Error::ParseError(_))));
    }

    #[test]
    fn test_remove_and_toggle() {
        let (_temp, conn) = create_test_db();
        add_repository(&conn, "r".to_string(), "https://r.example/repo".to_string(), true, 0)
            .unwrap();

        set_repository_enabled(&conn, "r", false).unwrap();
        assert!(!Repository::find_by_name(&conn, "r").unwrap().unwrap().enabled);

        remove_repository(&conn, "r").unwrap();
        assert!(Repository::find_by_name(&conn, "r").unwrap().is_none());
        assert!(matches!(
            remove_repository(&conn, "r"),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_mirror_management() {
        let (_temp, conn) = create_test_db();
        add_repository(&conn, "r".to_string(), "https://r.example/repo".to_string(), true, 0)
            .unwrap();

        add_user_mirror(&conn, "r", Mirror::new("https://m.example/repo")).unwrap();
        assert!(matches!(
            add_user_mirror(&conn, "r", Mirror::new("https://m.example/repo/")),
            Err(Error::ConflictError(_))
        ));

        set_mirror_enabled(&conn, "r", "https://r.example/repo", false).unwrap();
        let repo = Repository::find_by_name(&conn, "r").unwrap().unwrap();
        let urls: Vec<_> = effective_mirrors(&repo).into_iter().map(|m| m.url).collect();
        assert_eq!(urls, vec!["https://m.example/repo"]);

        set_mirror_enabled(&conn, "r", "https://r.example/repo", true).unwrap();
        remove_user_mirror(&conn, "r", "https://m.example/repo").unwrap();
        let repo = Repository::find_by_name(&conn, "r").unwrap().unwrap();
        let urls: Vec<_> = effective_mirrors(&repo).into_iter().map(|m| m.url).collect();
        assert_eq!(urls, vec!["https://r.example/repo"]);

        assert!(matches!(
            remove_user_mirror(&conn, "r", "https://m.example/repo"),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_bundled_list_parses() {
        let defaults = parse_default_repositories(DEFAULT_REPOSITORIES).unwrap();
        assert!(!defaults.is_empty());
        assert!(defaults.iter().all(|d| !d.mirrors.is_empty()));
    }

    #[test]
    fn test_seed_only_into_empty_store() {
        let (_temp, conn) = create_test_db();
        let json = r#"[
            {"name": "a", "address": "https://a.example/repo",
             "mirrors": ["https://a.example/repo", {"url": "https://gw.example", "is_ipfs": true}],
             "certificate": null, "enabled": true, "weight": 5},
            {"name": "b", "address": "https://b.example/repo", "enabled": false}
        ]"#;

        let added = seed_default_repositories(&conn, parse_default_repositories(json).unwrap()).unwrap();
        assert_eq!(added, 2);
        let a = Repository::find_by_name(&conn, "a").unwrap().unwrap();
        assert_eq!(a.official_mirrors.len(), 2);
        assert!(a.official_mirrors[1].is_ipfs);
        assert!(!Repository::find_by_name(&conn, "b").unwrap().unwrap().enabled);

        let again = seed_default_repositories(&conn, parse_default_repositories(json).unwrap()).unwrap();
        assert_eq!(again, 0);
        assert_eq!(Repository::count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_seed_rejects_bad_certificate() {
        let json = r#"[{"name": "a", "address": "https://a", "certificate": "xyz"}]"#;
        assert!(parse_default_repositories(json).is_err());
    }

    #[test]
    fn test_parse_fingerprint() {
        let fp = "AB:".repeat(31) + "AB";
        assert_eq!(parse_fingerprint(&fp).unwrap(), "ab".repeat(32));
        assert!(parse_fingerprint("abc").is_err());
    }
}
