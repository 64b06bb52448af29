mod common;

use aws_datasources::adapters::dynamodb::DynamoRequest;
use aws_datasources::domain::{FieldKind, KeyRole, PresentationSchema};
use aws_datasources::{DataSource, DynamoDataSource, ErrorKind, Model, QuerySpec, Record};
use common::{item, n, s, FakeDynamo};
use serde_json::json;

async fn posts() -> FakeDynamo {
    let fake = FakeDynamo::new("id", Some("rev"));
    for (id, rev, title) in [
        ("p1", 1, "Hello"),
        ("p1", 2, "Hello again"),
        ("p1", 3, "Hallo"),
        ("p2", 1, "Other"),
    ] {
        fake.insert(item(&[("id", s(id)), ("rev", n(rev)), ("title", s(title))]))
            .await;
    }
    fake
}

fn post() -> Model {
    Model::new("Post", "posts")
}

#[tokio::test]
async fn test_hash_and_range_equality_uses_get_item() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let query = QuerySpec::new()
        .condition("Post.id", "p1")
        .condition("Post.rev", 2);
    let rows = source.read(&post(), &query).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), &json!("Hello again"));
    assert_eq!(fake.request_names().await, vec!["DescribeTable", "GetItem"]);
}

#[tokio::test]
async fn test_range_order_is_pushed_into_query() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let query = QuerySpec::new()
        .condition("Post.id", "p1")
        .condition("Post.rev >=", 1)
        .order("Post.rev DESC")
        .fields(["rev"]);
    let rows = source.read(&post(), &query).await.unwrap();

    let revs: Vec<_> = rows.iter().map(|r| r.get("rev").clone()).collect();
    assert_eq!(revs, vec![json!(3), json!(2), json!(1)]);
    assert!(!rows[0].contains("id"));

    let requests = fake.requests().await;
    match &requests[1] {
        DynamoRequest::Query {
            key_conditions,
            forward,
            attributes,
            ..
        } => {
            assert_eq!(key_conditions.len(), 2);
            assert!(!forward);
            let attributes = attributes.as_ref().unwrap();
            assert!(attributes.contains(&"id".to_string()));
        }
        other => panic!("expected Query, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unpushable_like_runs_client_side() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let query = QuerySpec::new().condition("Post.title LIKE", "H_llo");
    let rows = source.read(&post(), &query).await.unwrap();

    let titles: Vec<_> = rows.iter().filter_map(|r| r.get_str("title")).collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Hello"));
    assert!(titles.contains(&"Hallo"));
    match &fake.requests().await[1] {
        DynamoRequest::Scan { filters, .. } => assert!(filters.is_empty()),
        other => panic!("expected Scan, got {:?}", other),
    }
}

#[tokio::test]
async fn test_like_ignores_case() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    for pattern in ["%ELL%", "he%", "HELLO"] {
        let query = QuerySpec::new()
            .condition("Post.id", "p1")
            .condition("Post.title LIKE", pattern)
            .order("Post.rev");
        let rows = source.read(&post(), &query).await.unwrap();
        let titles: Vec<_> = rows.iter().filter_map(|r| r.get_str("title")).collect();
        if pattern == "HELLO" {
            assert_eq!(titles, vec!["Hello"]);
        } else {
            assert_eq!(titles, vec!["Hello", "Hello again"], "pattern {}", pattern);
        }
    }

    for request in fake.requests().await {
        if let DynamoRequest::Query { filters, .. } = request {
            assert!(filters.is_empty());
        }
    }
}

#[tokio::test]
async fn test_client_side_pagination() {
    let fake = FakeDynamo::new("id", None);
    for i in 1..=25 {
        fake.insert(item(&[("id", s(&format!("item-{}", i))), ("n", n(i))]))
            .await;
    }
    let source = DynamoDataSource::new(fake);
    let model = Model::new("Item", "items");

    let page = |p: usize| QuerySpec::new().order("Item.n").limit(10).page(p);
    let first = source.read(&model, &page(1)).await.unwrap();
    let third = source.read(&model, &page(3)).await.unwrap();

    let numbers = |rows: &[aws_datasources::ResultRow]| {
        rows.iter().map(|r| r.get("n").as_i64().unwrap()).collect::<Vec<_>>()
    };
    assert_eq!(numbers(&first[..]), (1..=10).collect::<Vec<_>>());
    assert_eq!(numbers(&third[..]), (21..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_count_uses_select_count() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let query = QuerySpec::new().condition("Post.id", "p1").count();
    let rows = source.read(&post(), &query).await.unwrap();

    assert_eq!(rows[0].get("count"), &json!(3));
    assert!(matches!(
        fake.requests().await[1],
        DynamoRequest::Query { count: true, .. }
    ));
}

#[tokio::test]
async fn test_create_returns_key_pair() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let record = Record::new()
        .with("id", "p3")
        .with("rev", "1")
        .with("title", "New")
        .with("tags", json!(["a", "b", "a"]));
    let id = source.create(&post(), &record).await.unwrap();
    assert_eq!(id, json!(["p3", "1"]));

    let stored = fake
        .items()
        .await
        .into_iter()
        .find(|i| i.get("id") == Some(&s("p3")))
        .unwrap();
    assert_eq!(stored.get("rev"), Some(&n(1)));

    let err = source
        .create(&post(), &Record::new().with("title", "no key"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_update_with_null_deletes_attribute() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    let model = post().with_id(json!(["p2", 1]));
    let record = Record::new()
        .with("title", serde_json::Value::Null)
        .with("views", 10);
    source.update(&model, &record).await.unwrap();

    let updated = fake
        .items()
        .await
        .into_iter()
        .find(|i| i.get("id") == Some(&s("p2")))
        .unwrap();
    assert!(updated.get("title").is_none());
    assert_eq!(updated.get("views"), Some(&n(10)));
}

#[tokio::test]
async fn test_delete_by_key_pair() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());

    source
        .delete(&post().with_id(json!(["p1", 3])))
        .await
        .unwrap();
    assert_eq!(fake.items().await.len(), 3);

    let err = source.delete(&post().with_id("p1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_schema_keys_skip_describe_table() {
    let fake = posts().await;
    let source = DynamoDataSource::new(fake.clone());
    let schema = PresentationSchema::default()
        .key_field("id", FieldKind::String, KeyRole::Hash)
        .key_field("rev", FieldKind::Integer, KeyRole::Range);

    let query = QuerySpec::new().condition("Post.id", "p2");
    let rows = source
        .read(&post().with_schema(schema), &query)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(fake.request_names().await, vec!["Query"]);
}

#[tokio::test]
async fn test_describe_and_list_tables() {
    let source = DynamoDataSource::new(posts().await);

    let schema = source
        .describe(&post().with_schema(PresentationSchema::default().field("title", FieldKind::Text)))
        .await
        .unwrap();
    assert_eq!(schema.key_for(KeyRole::Hash).unwrap().name, "id");
    assert_eq!(schema.kind_of("rev"), Some(FieldKind::Float));
    assert_eq!(schema.kind_of("title"), Some(FieldKind::Text));

    assert_eq!(source.list_sources().await.unwrap(), vec!["posts"]);
}
