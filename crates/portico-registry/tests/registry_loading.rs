use std::fs;
use std::path::Path;

use portico_core::HttpMethod;
use portico_registry::{
    DEFINITION_FILE, EndpointGroup, EndpointKind, EndpointRegistry, EndpointTarget, KindDetails,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, body: &str) {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(DEFINITION_FILE), body).unwrap();
}

fn fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write(
        root,
        "SQL/CRM/Accounts",
        r#"{
            "Type": "SQL",
            "DatabaseObjectName": "Accounts",
            "DatabaseSchema": "crm",
            "PrimaryKey": "AccountId",
            "AllowedColumns": ["AccountId;Id", "Name"],
            "AllowedMethods": ["GET"],
            "NamespaceDisplayName": "Customer relations"
        }"#,
    );
    write(
        root,
        "SQL/Legacy/Items",
        r#"{"DatabaseObjectName": "Items", "AllowedMethods": ["GET", "POST"]}"#,
    );
    write(
        root,
        "Proxy/Orders",
        r#"{"Url": "http://backend:8080/svc/Orders", "Methods": ["GET", "POST"]}"#,
    );
    write(
        root,
        "Proxy/Internal/Lines",
        r#"{"Type": "Private", "Url": "http://backend:8080/svc/Lines", "Methods": ["POST"]}"#,
    );
    write(
        root,
        "Proxy/ApiShadow",
        r#"{"Type": "Standard", "Url": "http://backend:8080/svc/X", "Methods": ["GET"], "Namespace": "api"}"#,
    );
    write(
        root,
        "Composite/SalesOrder",
        r#"{
            "Type": "Composite",
            "AllowedEnvironments": ["prod"],
            "CompositeConfig": {
                "Name": "SalesOrder",
                "Steps": [
                    {"Name": "CreateLines", "Endpoint": "Internal/Lines", "IsArray": true, "ArrayProperty": "Lines"},
                    {"Name": "CreateHeader", "Endpoint": "Orders", "DependsOn": "CreateLines"}
                ]
            }
        }"#,
    );
    write(
        root,
        "Webhooks/Events",
        r#"{"Type": "Webhook", "DatabaseObjectName": "WebhookEvents", "AllowedColumns": ["order-created"]}"#,
    );
    write(
        root,
        "Static/Countries",
        r#"{"Type": "Static", "ContentFile": "countries.json"}"#,
    );
    write(
        root,
        "Files/Attachments",
        r#"{"Type": "File", "BaseDirectory": "/srv/attachments", "AllowedExtensions": [".pdf"]}"#,
    );

    tmp
}

#[tokio::test]
async fn test_every_group_loads() {
    let tmp = fixture();
    let registry = EndpointRegistry::new(tmp.path());

    let sql = registry.get(EndpointGroup::Sql).await;
    assert_eq!(sql.len(), 2);
    let accounts = sql.get("CRM/Accounts").unwrap();
    assert_eq!(accounts.kind, EndpointKind::RelationalObject);
    assert_eq!(accounts.namespace_display_name.as_deref(), Some("Customer relations"));
    assert_eq!(accounts.columns().alias("accountid"), Some("Id"));
    assert_eq!(
        sql.get("Legacy/Items").unwrap().target,
        EndpointTarget::DatabaseObject {
            schema: "dbo".into(),
            name: "Items".into()
        }
    );

    let proxy = registry.get(EndpointGroup::Proxy).await;
    assert_eq!(proxy.len(), 2);
    assert_eq!(proxy.get("Orders").unwrap().kind, EndpointKind::Forwarding);
    let lines = proxy.get("Internal/Lines").unwrap();
    assert!(lines.is_private);
    assert!(lines.allows_method(HttpMethod::Post));

    let composite = registry.get(EndpointGroup::Composite).await;
    let sales = composite.get("SalesOrder").unwrap();
    let workflow = sales.workflow.as_ref().unwrap();
    assert_eq!(workflow.steps.len(), 2);
    assert_eq!(workflow.steps[1].depends_on.as_deref(), Some("CreateLines"));
    assert!(sales.allows_environment("PROD"));
    assert!(!sales.allows_environment("dev"));

    let webhook = registry.get(EndpointGroup::Webhook).await;
    assert!(matches!(
        &webhook.get("Events").unwrap().details,
        KindDetails::Webhook { allowed_ids } if allowed_ids == &vec!["order-created".to_string()]
    ));

    assert_eq!(registry.get(EndpointGroup::Static).await.len(), 1);
    assert_eq!(registry.get(EndpointGroup::File).await.len(), 1);
    assert!(registry.is_ready());
}

#[tokio::test]
async fn test_reserved_namespace_is_never_routable() {
    let tmp = fixture();
    let registry = EndpointRegistry::new(tmp.path());

    let proxy = registry.get(EndpointGroup::Proxy).await;
    assert!(proxy.get("api/ApiShadow").is_none());
    assert!(proxy.get("ApiShadow").is_none());
    assert!(registry.resolve(&["api", "ApiShadow"]).await.is_none());
}

#[tokio::test]
async fn test_namespaced_key_and_bare_alias_do_not_conflict() {
    let tmp = fixture();
    let registry = EndpointRegistry::new(tmp.path());

    let sql = registry.get(EndpointGroup::Sql).await;
    assert!(sql.contains_key("CRM/Accounts"));
    assert!(sql.contains_key("Accounts"));
    assert!(registry.audit().await.is_empty());
}

#[tokio::test]
async fn test_full_reload_picks_up_removed_and_added_files() {
    let tmp = fixture();
    let registry = EndpointRegistry::new(tmp.path());
    assert_eq!(registry.get(EndpointGroup::Proxy).await.len(), 2);

    fs::remove_dir_all(tmp.path().join("Proxy/Orders")).unwrap();
    write(
        tmp.path(),
        "Proxy/Invoices",
        r#"{"Type": "Standard", "Url": "http://backend:8080/svc/Invoices", "Methods": ["GET"]}"#,
    );

    let report = registry.reload(None).await;
    assert_eq!(report.counts.len(), EndpointGroup::ALL.len());
    assert_eq!(report.counts[&EndpointGroup::Proxy], 2);

    let proxy = registry.get(EndpointGroup::Proxy).await;
    assert!(proxy.get("Orders").is_none());
    assert!(proxy.get("Invoices").is_some());
}
