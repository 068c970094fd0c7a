use roster_core::{Modification, Scope};
use roster_directory::Directory;
use roster_test_utils::assertions::{
    assert_auth_rejected, assert_modify_failed, assert_no_hosts, assert_search_failed,
};
use roster_test_utils::fixtures::{apache_directory, config_for, person_dn, ALICE_PASSWORD, SUFFIX};
use roster_test_utils::MockDirectory;

fn people_base() -> String {
    format!("ou=people,{}", SUFFIX)
}

fn directory(mock: &MockDirectory, hosts: &[&str]) -> Directory {
    Directory::new(&config_for(hosts), mock.connector()).expect("directory")
}

#[tokio::test]
async fn search_recovers_after_n_failures_with_n_plus_one_connects() {
    let mock = apache_directory();
    mock.fail_next_searches(2);
    let dir = directory(&mock, &["ldap://h1", "ldap://h2", "ldap://h3"]);

    let rows = dir
        .search_one_level(&people_base(), "(uid=alice)", &["mail"])
        .await
        .expect("search succeeds on third host");

    assert_eq!(rows.len(), 1);
    assert_eq!(mock.total_connects(), 3);
    assert_eq!(mock.connect_attempts("h1"), 1);
    assert_eq!(mock.connect_attempts("h2"), 1);
    assert_eq!(mock.connect_attempts("h3"), 1);
    assert_eq!(dir.current_host().await.map(|h| h.host().to_string()), Some("h3".into()));
}

#[tokio::test]
async fn search_gives_up_after_host_count_attempts() {
    let mock = apache_directory();
    mock.fail_next_searches(u32::MAX);
    let dir = directory(&mock, &["ldap://h1", "ldap://h2", "ldap://h3"]);

    let result = dir.search_one_level(&people_base(), "(uid=alice)", &[]).await;

    assert_search_failed(&result, 3);
    assert_eq!(mock.total_searches(), 3);
    let stats = dir.stats();
    assert_eq!(stats.searches, 3);
    assert_eq!(stats.failed_searches, 3);
}

#[tokio::test]
async fn single_host_still_gets_two_attempts() {
    let mock = apache_directory();
    mock.fail_next_searches(u32::MAX);
    let dir = directory(&mock, &["ldap://only"]);

    let result = dir.search_one_level(&people_base(), "(uid=alice)", &[]).await;

    assert_search_failed(&result, 2);
    assert_eq!(mock.total_searches(), 2);
    assert_eq!(mock.connect_attempts("only"), 2);
}

#[tokio::test]
async fn single_host_recovers_on_second_attempt() {
    let mock = apache_directory();
    mock.fail_next_searches(1);
    let dir = directory(&mock, &["ldap://only"]);

    let rows = dir
        .search_one_level(&people_base(), "(uid=bob)", &[])
        .await
        .expect("second attempt succeeds");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn unreachable_hosts_consume_attempts() {
    let mock = apache_directory();
    mock.fail_connect("h1");
    mock.fail_connect("h2");
    let dir = directory(&mock, &["ldap://h1", "ldap://h2"]);

    let result = dir.search_one_level(&people_base(), "(uid=alice)", &[]).await;

    assert_search_failed(&result, 2);
    assert_eq!(mock.total_connects(), 4);
    assert_eq!(mock.total_searches(), 0);
}

#[tokio::test]
async fn search_attribute_unwraps_and_drops_missing() {
    let mock = apache_directory();
    let dir = directory(&mock, &["ldap://h1"]);

    let mut mails = dir
        .search_attribute(&people_base(), "(uid=*)", "mail")
        .await
        .expect("search");
    mails.sort();

    assert_eq!(
        mails,
        vec![
            vec!["alice@example.org".to_string()],
            vec!["carol@example.org".to_string()],
        ]
    );
}

#[tokio::test]
async fn zero_rows_is_not_an_error() {
    let mock = apache_directory();
    let dir = directory(&mock, &["ldap://h1"]);
    let rows = dir
        .search(&people_base(), Scope::OneLevel, "(uid=nobody)", &[])
        .await
        .expect("search");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn bind_failure_on_first_host_fails_over() {
    let mock = apache_directory();
    mock.fail_bind("h1");
    let dir = directory(&mock, &["ldap://h1", "ldap://h2"]);

    let mails = dir
        .search_attribute(&people_base(), "(uid=alice)", "mail")
        .await
        .expect("search");

    assert_eq!(mails, vec![vec!["alice@example.org".to_string()]]);
    assert_eq!(mock.connect_attempts("h1"), 1);
    assert_eq!(mock.host_state("h1").binds, 1);
    assert_eq!(mock.connect_attempts("h2"), 1);
    assert_eq!(mock.host_state("h2").searches, 1);
    let stats = dir.stats();
    assert_eq!(stats.connect_attempts, 2);
    assert_eq!(stats.failed_connects, 1);
}

#[tokio::test]
async fn session_is_reused_between_searches() {
    let mock = apache_directory();
    let dir = directory(&mock, &["ldap://h1", "ldap://h2"]);

    for _ in 0..3 {
        dir.search_one_level(&people_base(), "(uid=alice)", &["cn"])
            .await
            .expect("search");
    }
    assert_eq!(mock.total_connects(), 1);

    dir.disconnect().await;
    assert!(dir.current_host().await.is_none());
    dir.search_one_level(&people_base(), "(uid=alice)", &["cn"])
        .await
        .expect("search");
    assert_eq!(mock.total_connects(), 2);
}

#[tokio::test]
async fn deadline_stops_retrying_early() {
    let mock = apache_directory();
    mock.fail_next_searches(u32::MAX);
    let mut config = config_for(&["ldap://h1", "ldap://h2", "ldap://h3"]);
    config.retry_backoff_ms = 100;
    config.search_deadline_ms = Some(50);
    let dir = Directory::new(&config, mock.connector()).expect("directory");

    let result = dir.search_one_level(&people_base(), "(uid=alice)", &[]).await;

    assert_search_failed(&result, 1);
    assert_eq!(mock.total_searches(), 1);
}

#[tokio::test]
async fn no_hosts_is_fatal() {
    let mock = apache_directory();
    let mut config = config_for(&[]);
    config.default_hosts.clear();
    let dir = Directory::new(&config, mock.connector()).expect("directory");

    let result = dir.search_one_level(&people_base(), "(uid=alice)", &[]).await;

    assert_no_hosts(&result);
    assert_eq!(mock.total_connects(), 0);
}

#[tokio::test]
async fn modify_updates_directory_without_retry() {
    let mock = apache_directory();
    let dir = directory(&mock, &["ldap://h1"]);
    let dn = person_dn("bob");
    let change = [Modification::replace("mail", vec!["bob@example.org".into()])];

    dir.modify(&dn, &change).await.expect("modify");
    dir.modify(&dn, &change).await.expect("repeat modify");
    assert_eq!(mock.values(&dn, "mail"), Some(vec!["bob@example.org".to_string()]));
    assert_eq!(mock.modify_log().len(), 2);

    mock.reject_modify(&dn);
    let result = dir.modify(&dn, &change).await;
    assert_modify_failed(&result);
    assert_eq!(mock.modify_log().len(), 2);
    // A directory-side rejection keeps the session.
    assert!(dir.current_host().await.is_some());
    assert_eq!(mock.total_connects(), 1);
}

#[tokio::test]
async fn bind_as_uses_dedicated_session() {
    let mock = apache_directory();
    mock.fail_connect("h1");
    let dir = directory(&mock, &["ldap://h1", "ldap://h2"]);
    let alice = person_dn("alice");

    let mut session = dir.bind_as(&alice, ALICE_PASSWORD).await.expect("bind");
    assert_eq!(session.host().host(), "h2");
    assert_eq!(session.dn(), alice);
    let rows = session
        .search(&people_base(), Scope::OneLevel, "(uid=alice)", &["uid"])
        .await
        .expect("bound search");
    assert_eq!(rows.len(), 1);
    session.release().await;

    // The shared session was never opened.
    assert!(dir.current_host().await.is_none());

    let rejected = dir.bind_as(&alice, "wrong").await;
    assert_auth_rejected(&rejected);
}

#[tokio::test]
async fn bind_as_fails_over_when_host_cannot_answer() {
    let mock = apache_directory();
    mock.bind_unavailable("h1");
    let dir = directory(&mock, &["ldap://h1", "ldap://h2"]);

    let session = dir
        .bind_as(&person_dn("alice"), ALICE_PASSWORD)
        .await
        .expect("bind on h2");

    assert_eq!(session.host().host(), "h2");
    assert_eq!(mock.host_state("h1").binds, 1);
    assert_eq!(mock.host_state("h2").binds, 1);
    session.release().await;
}
