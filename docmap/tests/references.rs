use docmap::{
    bson::{Bson, doc, oid::ObjectId},
    memory::InMemoryDocumentSource,
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Default, Entity)]
#[docmap(alias = "crm::Account", collection = "accounts")]
struct Account {
    #[docmap(id)]
    id: Option<String>,
    owner: String,
}

#[derive(Debug, Clone, PartialEq, Default, Entity)]
#[docmap(alias = "crm::Tag")]
struct Tag {
    label: String,
}

#[derive(Debug, Clone, PartialEq, Default, Entity)]
#[docmap(alias = "crm::Customer", collection = "customers")]
struct Customer {
    #[docmap(id)]
    id: Option<String>,
    name: String,
    #[docmap(reference)]
    account: Option<Account>,
    #[docmap(reference(collection = "archived_accounts", db = "archive"))]
    previous: Vec<Account>,
    #[docmap(reference)]
    tag: Option<Tag>,
}

fn context() -> MappingContext {
    MappingContext::builder()
        .register::<Account>()
        .unwrap()
        .register::<Tag>()
        .unwrap()
        .register::<Customer>()
        .unwrap()
        .build()
}

fn setup() -> (MappingConverter, InMemoryDocumentSource) {
    let source = InMemoryDocumentSource::new();
    let converter = MappingConverter::builder(context())
        .resolver(source.clone())
        .build()
        .unwrap();

    (converter, source)
}

fn account(owner: &str) -> Account {
    Account { id: Some(ObjectId::new().to_hex()), owner: owner.into() }
}

#[test]
fn references_are_stored_as_pointers() {
    let (converter, _) = setup();
    let current = account("ada");
    let old = account("ada-old");
    let customer = Customer {
        id: Some("c1".into()),
        name: "Ada".into(),
        account: Some(current.clone()),
        previous: vec![old.clone()],
        tag: None,
    };

    let record = converter.write_document(&Value::object(customer)).unwrap();
    let current_id = ObjectId::parse_str(current.id.as_deref().unwrap()).unwrap();
    let old_id = ObjectId::parse_str(old.id.as_deref().unwrap()).unwrap();

    assert_eq!(
        record.get_document("account").unwrap(),
        &doc! { "$ref": "accounts", "$id": current_id }
    );
    assert_eq!(
        record.get_array("previous").unwrap(),
        &vec![Bson::Document(doc! { "$ref": "archived_accounts", "$id": old_id, "$db": "archive" })]
    );
    assert!(!record.contains_key("tag"));

    // associations follow ordinary properties
    let keys = record.keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(keys, ["_class", "_id", "name", "account", "previous"]);
}

#[test]
fn references_resolve_on_read() {
    let (converter, source) = setup();
    let current = account("ada");
    let old = account("ada-old");

    source.save(&converter, &Value::object(current.clone())).unwrap();
    source
        .insert_into(
            "archive",
            "archived_accounts",
            converter.write_document(&Value::object(old.clone())).unwrap(),
        )
        .unwrap();

    let customer = Customer {
        id: Some("c1".into()),
        name: "Ada".into(),
        account: Some(current),
        previous: vec![old],
        tag: None,
    };

    let record = converter.write_document(&Value::object(customer.clone())).unwrap();
    let back: Customer = converter.read(&record).unwrap();

    assert_eq!(back, customer);
}

#[test]
fn dangling_references_read_as_null() {
    let (converter, source) = setup();
    let current = account("ada");
    let id = source.save(&converter, &Value::object(current.clone())).unwrap();

    let customer = Customer { name: "Ada".into(), account: Some(current), ..Default::default() };
    let record = converter.write_document(&Value::object(customer)).unwrap();

    source.remove("accounts", &id);

    let back: Customer = converter.read(&record).unwrap();
    assert_eq!(back.account, None);
    assert_eq!(back.name, "Ada");
}

#[test]
fn dangling_references_are_dropped_from_lists() {
    let (converter, source) = setup();
    let kept = account("ada-2019");
    let gone = account("ada-2018");

    source
        .insert_into(
            "archive",
            "archived_accounts",
            converter.write_document(&Value::object(kept.clone())).unwrap(),
        )
        .unwrap();

    let customer = Customer {
        name: "Ada".into(),
        previous: vec![kept.clone(), gone],
        ..Default::default()
    };
    let record = converter.write_document(&Value::object(customer)).unwrap();
    assert_eq!(record.get_array("previous").unwrap().len(), 2);

    let back: Customer = converter.read(&record).unwrap();
    assert_eq!(back.previous, vec![kept]);
    assert_eq!(back.name, "Ada");
}

#[test]
fn null_reference_id_fails() {
    let (converter, _) = setup();
    let customer = Customer {
        account: Some(Account { id: None, owner: "nobody".into() }),
        ..Default::default()
    };

    assert_eq!(
        converter.write_document(&Value::object(customer)).unwrap_err(),
        MappingError::NullReferenceId("crm::Account".into())
    );
}

#[test]
fn reference_target_needs_an_id_property() {
    let (converter, _) = setup();
    let customer = Customer { tag: Some(Tag { label: "vip".into() }), ..Default::default() };

    assert_eq!(
        converter.write_document(&Value::object(customer)).unwrap_err(),
        MappingError::ReferenceWithoutId("crm::Tag".into())
    );
}

#[test]
fn detached_converter_cannot_resolve() {
    let converter = MappingConverter::builder(context()).build().unwrap();
    let record = doc! {
        "name": "Ada",
        "account": { "$ref": "accounts", "$id": ObjectId::new() },
    };

    assert!(matches!(
        converter.read::<Customer>(&record),
        Err(MappingError::UnresolvableReference(_))
    ));
}
