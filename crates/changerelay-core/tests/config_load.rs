//! Configuration loading and validation.

use std::io::Write;

use changerelay_core::{Config, ConfigError};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

const BASE: &str = r#"
[broker]
host = "localhost"
port = 5672
username = "guest"
password = "guest"
queue = "changes"

[buildbot]
host = "localhost"
port = 8010
username = "user"
password = "password"
"#;

#[test]
fn minimal_config_gets_defaults() {
    let file = write_config(BASE);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.broker.queue, "changes");
    assert_eq!(config.buildbot.port, 8010);
    assert!(config.git.is_none());
    assert!(config.svn.is_none());
    assert_eq!(config.client.retry_timeout, 5);
    assert_eq!(config.client.max_retries, 1);
    assert!(config.server.retry_on_disconnect);
    assert!(config.log.level.is_none());
}

#[test]
fn git_section_parses_with_first_parent_default() {
    let contents = format!("{BASE}\n[git]\nrepository = \"/srv/git/repo.git\"\n");
    let config = Config::load(write_config(&contents).path()).unwrap();

    let git = config.git.unwrap();
    assert_eq!(git.repository, "/srv/git/repo.git");
    assert!(git.first_parent);
}

#[test]
fn svn_filters_parse_from_the_config_string() {
    let contents = format!(
        "{BASE}\n[svn]\nrepository = \"/srv/svn/repo\"\nbranch_filters = \"project,trunk,0,2|project,branches,0,3\"\n"
    );
    let config = Config::load(write_config(&contents).path()).unwrap();

    let svn = config.svn.unwrap();
    let filters = svn.filters().unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0].segments, vec!["project", "trunk"]);
    assert_eq!(filters[0].from, 0);
    assert_eq!(filters[0].to, 2);
}

#[test]
fn declaring_both_vcs_sections_is_rejected() {
    let contents = format!(
        "{BASE}\n[git]\nrepository = \"/srv/git/repo.git\"\n\n[svn]\nrepository = \"/srv/svn/repo\"\n"
    );
    let err = Config::load(write_config(&contents).path()).unwrap_err();

    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn malformed_filter_string_is_rejected_at_load() {
    let contents = format!(
        "{BASE}\n[svn]\nrepository = \"/srv/svn/repo\"\nbranch_filters = \"project,trunk,zero,two\"\n"
    );
    let err = Config::load(write_config(&contents).path()).unwrap_err();

    assert!(matches!(err, ConfigError::Filter { .. }));
}

#[test]
fn missing_file_is_a_read_error() {
    let err = Config::load(std::path::Path::new("/nonexistent/config.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read(_)));
}
