//! End-to-end crawl against a mock forum: index walk, thread pagination,
//! identity resolution and interaction-graph construction.

use std::collections::HashSet;

use forum_graph_scraper::config::Config;
use forum_graph_scraper::crawl::run_crawl;
use forum_graph_scraper::model::InteractionType;
use forum_graph_scraper::sink::VecSink;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_PAGE: &str = r#"
    <div class="structItem structItem--thread">
      <h3 class="structItem-title"><a href="/threads/topic.55/">Topic</a></h3>
    </div>
"#;

/// Page 1: P1 by alice, P2 by bob quoting P1.
const THREAD_PAGE_1: &str = r#"
    <article class="message js-post" id="js-post-101">
      <div class="MessageCard__user-info__name"><a href="/members/alice.7/">alice</a></div>
      <time datetime="2024-05-01T10:00:00+0000">May 1</time>
      <div class="message-body"><div class="bbWrapper">
        Opening thoughts on the topic.
      </div></div>
    </article>
    <article class="message js-post" id="js-post-102">
      <div class="MessageCard__user-info__name"><a href="/members/bob.8/">bob</a></div>
      <time datetime="2024-05-01T10:05:00+0000">May 1</time>
      <div class="message-body"><div class="bbWrapper">
        <blockquote data-quote="alice" data-source="post: 101">
          Opening thoughts on the topic.
        </blockquote>
        I agree with all of this.
      </div></div>
    </article>
    <a rel="next" href="/threads/topic.55/page-2">next</a>
"#;

/// Page 2: P3 by carol mentioning alice.
const THREAD_PAGE_2: &str = r#"
    <article class="message js-post" id="js-post-201">
      <div class="MessageCard__user-info__name"><a href="/members/carol.9/">carol</a></div>
      <time datetime="2024-05-02T08:00:00+0000">May 2</time>
      <div class="message-body"><div class="bbWrapper">
        Looping in <a href="/members/alice.7/" data-user-id="7" class="username">@alice</a> here.
      </div></div>
    </article>
"#;

fn profile_html(name: &str) -> String {
    format!(
        r#"
        <h1 class="p-title-value">{name}</h1>
        <div class="memberHeader-content">
          <span class="userTitle">Member</span>
          <time datetime="2020-01-01T00:00:00+0000">Jan 1, 2020</time>
        </div>
        <dl class="pairs"><dt>Replies</dt><dd>10</dd></dl>
    "#
    )
}

async fn mount_forum(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/forums/general.1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/topic.55/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREAD_PAGE_1))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/topic.55/page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREAD_PAGE_2))
        .mount(server)
        .await;

    // alice appears as author of P1 and as mention target in P3; her
    // profile must be fetched exactly once.
    Mock::given(method("GET"))
        .and(path("/members/alice.7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_html("Alice")))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/bob.8/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_html("Bob")))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/carol.9/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_html("Carol")))
        .expect(1)
        .mount(server)
        .await;
}

fn test_config(server: &MockServer) -> Config {
    Config {
        forum_url: format!("{}/forums/general.1/", server.uri()),
        base_url: server.uri(),
        ..Config::for_testing()
    }
}

#[tokio::test]
async fn test_two_page_thread_end_to_end() {
    let server = MockServer::start().await;
    mount_forum(&server).await;

    let config = test_config(&server);
    let mut sink = VecSink::default();
    let stats = run_crawl(&config, &mut sink).await.expect("crawl");

    // Posts, in page order then document order.
    assert_eq!(stats.posts, 3);
    let post_ids: Vec<&str> = sink
        .posts
        .iter()
        .map(|p| p.post_id.as_deref().unwrap())
        .collect();
    assert_eq!(post_ids, vec!["101", "102", "201"]);

    // Canonical usernames and ids from the resolved profiles.
    assert_eq!(sink.posts[0].user_id.as_deref(), Some("7"));
    assert_eq!(sink.posts[0].username.as_deref(), Some("Alice"));
    assert_eq!(sink.posts[1].user_id.as_deref(), Some("8"));
    assert_eq!(sink.posts[2].user_id.as_deref(), Some("9"));

    // One quote edge and one mention edge.
    assert_eq!(sink.interactions.len(), 2);

    let quote = sink
        .interactions
        .iter()
        .find(|i| i.interaction_type == InteractionType::Quote)
        .expect("quote edge");
    assert_eq!(quote.replying_post_id, "102");
    assert_eq!(quote.target_post_id.as_deref(), Some("101"));
    assert_eq!(quote.source_user_id.as_deref(), Some("8"));
    assert_eq!(quote.target_user_id.as_deref(), Some("7"));
    assert!((quote.confidence - 1.0).abs() < f64::EPSILON);

    let mention = sink
        .interactions
        .iter()
        .find(|i| i.interaction_type == InteractionType::Mention)
        .expect("mention edge");
    assert_eq!(mention.replying_post_id, "201");
    assert_eq!(mention.target_post_id, None);
    assert_eq!(mention.source_user_id.as_deref(), Some("9"));
    assert_eq!(mention.target_user_id.as_deref(), Some("7"));
    assert!((mention.confidence - 0.7).abs() < f64::EPSILON);

    // Every interaction source is a post observed in this run.
    let observed: HashSet<&str> = post_ids.iter().copied().collect();
    for interaction in &sink.interactions {
        assert!(observed.contains(interaction.replying_post_id.as_str()));
    }

    // All interactions share the thread and carry unique ids.
    let unique: HashSet<&str> = sink
        .interactions
        .iter()
        .map(|i| i.interaction_id.as_str())
        .collect();
    assert_eq!(unique.len(), sink.interactions.len());
    assert!(sink.interactions.iter().all(|i| i.thread_id == "55"));

    // Users: one record each, alice fetched once (asserted by the mock).
    assert_eq!(stats.users, 3);
    let user_ids: Vec<&str> = sink.users.iter().map(|u| u.user_id.as_str()).collect();
    assert_eq!(user_ids, vec!["7", "8", "9"]);

    // One thread summary.
    assert_eq!(sink.threads.len(), 1);
    let summary = &sink.threads[0];
    assert_eq!(summary.thread_id, "55");
    assert_eq!(
        summary.forum_url.as_deref(),
        Some(config.forum_url.as_str())
    );
    assert_eq!(summary.first_seen, summary.last_seen);
}

#[tokio::test]
async fn test_failed_thread_page_does_not_abort_thread() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forums/general.1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
        .mount(&server)
        .await;
    // Page 1 works during the walk, page 2 always fails.
    Mock::given(method("GET"))
        .and(path("/threads/topic.55/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREAD_PAGE_1))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/topic.55/page-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/alice.7/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_html("Alice")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members/bob.8/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(profile_html("Bob")))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let mut sink = VecSink::default();
    let stats = run_crawl(&config, &mut sink).await.expect("crawl");

    // Page 1 posts survive even though page 2 could not be fetched.
    assert_eq!(stats.threads_scraped, 1);
    assert_eq!(stats.posts, 2);
    assert_eq!(sink.threads.len(), 1);
}

#[tokio::test]
async fn test_profile_failure_degrades_to_id_stub() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forums/general.1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/topic.55/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREAD_PAGE_2))
        .mount(&server)
        .await;
    // carol's profile pages all 404: resolution fails at the final tier.

    let config = test_config(&server);
    let mut sink = VecSink::default();
    let stats = run_crawl(&config, &mut sink).await.expect("crawl");

    assert_eq!(stats.posts, 1);
    // The id stub comes from the URL pattern; the markup username is kept.
    assert_eq!(sink.posts[0].user_id.as_deref(), Some("9"));
    assert_eq!(sink.posts[0].username.as_deref(), Some("carol"));
    // Nothing was cached, so no user record is exported.
    assert_eq!(stats.users, 0);
}

#[tokio::test]
async fn test_unreachable_forum_index_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forums/general.1/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let mut sink = VecSink::default();
    let result = run_crawl(&config, &mut sink).await;

    assert!(result.is_err());
    assert!(sink.posts.is_empty());
}
