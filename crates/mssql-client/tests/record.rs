//! Scanning rows into structs with `#[derive(Record)]`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use mssql_client::{Column, Error, ResultSet, Session, SqlValue, TypeError, WireType};
use mssql_derive::Record;
use mssql_testing::{MockResultSet, MockServer, Reply};
use tds_transport::Connector;

#[derive(Debug, Default, Record)]
struct Author {
    au_id: String,
    #[mssql(rename = "au_lname")]
    last_name: String,
    #[allow(non_snake_case)]
    AuFname: Option<String>,
    contract: bool,
    #[mssql(skip)]
    display: String,
}

#[derive(Debug, Default, Record)]
struct Ambiguous {
    au_id: String,
    #[mssql(rename = "AuId")]
    other_id: String,
    phone: String,
}

fn authors() -> ResultSet {
    let mut rs = ResultSet::new(vec![
        Column::new("au_id", 11, WireType::VarChar),
        Column::new("au_lname", 40, WireType::VarChar),
        Column::new("au_fname", 20, WireType::VarChar),
        Column::new("phone", 12, WireType::Char),
        Column::new("contract", 1, WireType::Bit),
        Column::new("display", 20, WireType::VarChar),
    ]);
    rs.push_row(vec![
        SqlValue::String("172-32-1176".into()),
        SqlValue::String("White".into()),
        SqlValue::Null,
        SqlValue::String("408 496-7223".into()),
        SqlValue::Bool(true),
        SqlValue::String("ignored".into()),
    ]);
    rs
}

#[test]
fn test_struct_is_filled_by_normalized_column_name() {
    let mut rs = authors();
    assert!(rs.next());
    let mut author = Author {
        AuFname: Some("stale".into()),
        ..Author::default()
    };
    rs.scan(&mut [&mut author]).unwrap();

    assert_eq!(author.au_id, "172-32-1176");
    assert_eq!(author.last_name, "White");
    assert_eq!(author.AuFname, None);
    assert!(author.contract);
    assert!(author.display.is_empty());
    // phone and display have no field
    assert_eq!(rs.scan_count(), 4);
}

#[test]
fn test_ambiguous_keys_are_left_unfilled() {
    let mut rs = authors();
    assert!(rs.next());
    let mut row = Ambiguous::default();
    rs.scan(&mut [&mut row]).unwrap();
    assert!(row.au_id.is_empty());
    assert!(row.other_id.is_empty());
    assert_eq!(row.phone, "408 496-7223");
}

#[test]
fn test_must_scan_counts_filled_fields() {
    let mut rs = authors();
    assert!(rs.next());
    let mut author = Author::default();
    assert!(matches!(
        rs.must_scan(5, &mut [&mut author]),
        Err(Error::ScanCount {
            expected: 5,
            actual: 4
        })
    ));
}

#[test]
fn test_record_among_several_destinations_is_a_mismatch() {
    let mut rs = authors();
    assert!(rs.next());
    let mut id = String::new();
    let mut author = Author::default();
    let err = rs.scan(&mut [&mut id, &mut author]).unwrap_err();
    assert!(matches!(
        err,
        Error::Type(TypeError::TypeMismatch {
            expected: "Author",
            ..
        })
    ));
}

#[tokio::test]
async fn test_scan_rows_from_a_session() {
    let server = MockServer::new();
    server.on(
        "from authors",
        Reply::result(
            MockResultSet::new()
                .column("au_id", WireType::VarChar, 11)
                .column("au_lname", WireType::VarChar, 40)
                .column("contract", WireType::Bit, 1)
                .row([
                    SqlValue::String("172-32-1176".into()),
                    SqlValue::String("White".into()),
                    SqlValue::Bool(true),
                ])
                .row([
                    SqlValue::String("213-46-8915".into()),
                    SqlValue::String("Green".into()),
                    SqlValue::Bool(false),
                ]),
        ),
    );
    let connector: Arc<dyn Connector> = Arc::new(server.clone());
    let mut session = Session::connect(connector, "host=db1;user=sa;pwd=p").await.unwrap();

    let mut results = session.exec("select au_id, au_lname, contract from authors").await.unwrap();
    let rs = &mut results[0];
    let mut authors = Vec::new();
    while rs.next() {
        let mut author = Author::default();
        rs.scan(&mut [&mut author]).unwrap();
        authors.push(author);
    }
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[1].last_name, "Green");
    assert!(!authors[1].contract);
}
