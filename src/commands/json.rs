//! RedisJSON: `JSON.GET`, `JSON.OBJKEYS`, `JSON.OBJLEN`, `JSON.TYPE` and
//! `JSON.ARRLEN`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{scalar_frame, Column, FieldUnion, Frame, Value};
use crate::query::QueryModel;

use serde_json::Value as Json;
use tracing::error;

use super::{reply_text, string_list};

fn key_and_path(qm: &QueryModel) -> Vec<&str> {
    let mut args = vec![qm.key_name.as_str()];
    if !qm.path.is_empty() {
        args.push(qm.path.as_str());
    }
    args
}

/// A JSON scalar as a cell; objects, arrays and null have none.
fn cell(value: &Json) -> Option<Value> {
    match value {
        Json::String(s) => Some(Value::from(s.as_str())),
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => n.as_f64().map(Value::Float),
        _ => None,
    }
}

/// `JSON.GET key [path]`: the document decoded into columns.
pub fn query_json_get(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("JSON.GET", &key_and_path(qm))?;
    let document: Json = serde_json::from_str(&reply_text(&reply))?;

    let mut frame = Frame::new(&qm.command);
    match &document {
        Json::String(s) => frame.push_column(Column::new(&qm.key_name, vec![s.clone()])),
        Json::Bool(b) => frame.push_column(Column::new(&qm.key_name, vec![*b])),
        Json::Object(fields) => {
            for (name, value) in fields {
                match cell(value) {
                    Some(Value::Str(s)) => frame.push_column(Column::new(name, vec![s])),
                    Some(Value::Bool(b)) => frame.push_column(Column::new(name, vec![b])),
                    Some(Value::Float(f)) => frame.push_column(Column::new(name, vec![f])),
                    _ => error!(field = %name, "unsupported JSON value"),
                }
            }
        }
        Json::Array(entries) => {
            let mut union = FieldUnion::new();
            for entry in entries {
                let Json::Object(fields) = entry else {
                    error!("skipping non-object JSON array entry");
                    continue;
                };
                union.push_row(fields.iter().filter_map(|(name, value)| match cell(value) {
                    Some(cell) => Some((name.as_str(), cell)),
                    None => {
                        error!(field = %name, "unsupported JSON value");
                        None
                    }
                }));
            }
            frame.columns = union.into_columns();
        }
        other => {
            error!(value = %other, "unexpected JSON document");
            return Ok(Vec::new());
        }
    }
    Ok(vec![frame])
}

/// `JSON.OBJKEYS key [path]`
pub fn query_json_objkeys(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let args: Vec<FlatArg> = key_and_path(qm)[1..].iter().map(|p| FlatArg::from(*p)).collect();
    let reply = client.run_flat_cmd("JSON.OBJKEYS", &qm.key_name, &args)?;
    Ok(vec![
        Frame::new(&qm.key_name).with_column(Column::new("Value", string_list(&reply)))
    ])
}

/// `JSON.OBJLEN`, `JSON.TYPE` and `JSON.ARRLEN`: one value per key.
pub fn query_json_scalar(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd(&qm.command.to_ascii_uppercase(), &key_and_path(qm))?;
    Ok(vec![scalar_frame(&qm.key_name, &reply_text(&reply), "Value")])
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk_array, ScriptedClient};
    use crate::frame::ColumnValues;
    use crate::resp::types::RespValue;

    fn model(command: &str, path: &str) -> QueryModel {
        QueryModel {
            command: command.into(),
            key_name: "doc".into(),
            path: path.into(),
            ..QueryModel::default()
        }
    }

    #[test]
    fn get_scalars() {
        let client = ScriptedClient::new().reply("\"hello\"").reply("true");
        let frames = query_json_get(&model("json.get", "$.name"), &client).unwrap();
        assert_eq!(client.first_call(), vec!["JSON.GET", "doc", "$.name"]);
        assert_eq!(frames[0].name, "json.get");
        assert_eq!(frames[0].columns[0].name, "doc");
        assert_eq!(frames[0].columns[0].values, ColumnValues::from(vec!["hello"]));

        let frames = query_json_get(&model("json.get", ""), &client).unwrap();
        assert_eq!(frames[0].columns[0].values, ColumnValues::Bool(vec![true]));
        assert_eq!(client.calls()[1], vec!["JSON.GET", "doc"]);
    }

    #[test]
    fn get_object() {
        let client = ScriptedClient::new().reply(r#"{"name":"Leonid","age":42,"active":true,"tags":["a"]}"#);
        let frames = query_json_get(&model("json.get", "."), &client).unwrap();
        let frame = &frames[0];
        assert_eq!(frame.columns.len(), 3);
        assert_eq!(frame.column("age").unwrap().values, ColumnValues::Float64(vec![42.0]));
        assert_eq!(frame.column("active").unwrap().values, ColumnValues::Bool(vec![true]));
    }

    #[test]
    fn get_array_of_objects_back_fills() {
        let client = ScriptedClient::new().reply(
            r#"[{"name":"a"},{"name":"b","score":1.5},{"done":true},{"name":"d","score":2}]"#,
        );
        let frames = query_json_get(&model("json.get", "$"), &client).unwrap();
        let frame = &frames[0];

        for column in &frame.columns {
            assert_eq!(column.len(), 4, "column {}", column.name);
        }
        assert_eq!(frame.column("name").unwrap().values, ColumnValues::from(vec!["a", "b", "", "d"]));
        assert_eq!(
            frame.column("score").unwrap().values,
            ColumnValues::Float64(vec![0.0, 1.5, 0.0, 2.0])
        );
        assert_eq!(
            frame.column("done").unwrap().values,
            ColumnValues::Bool(vec![false, false, true, false])
        );
    }

    #[test]
    fn get_array_with_mixed_types_keeps_every_cell() {
        let client = ScriptedClient::new().reply(r#"[{"a":"x"},{"a":5},{"b":true}]"#);
        let frames = query_json_get(&model("json.get", "."), &client).unwrap();
        let frame = &frames[0];
        assert_eq!(frame.column("a").unwrap().values, ColumnValues::from(vec!["x", "5", ""]));
        assert_eq!(
            frame.column("b").unwrap().values,
            ColumnValues::Bool(vec![false, false, true])
        );
    }

    #[test]
    fn get_number_has_no_frame() {
        let client = ScriptedClient::new().reply("12");
        assert!(query_json_get(&model("json.get", "."), &client).unwrap().is_empty());
    }

    #[test]
    fn get_invalid_json() {
        let client = ScriptedClient::new().reply("{oops");
        assert!(query_json_get(&model("json.get", "."), &client).is_err());
    }

    #[test]
    fn objkeys_and_scalars() {
        let client = ScriptedClient::new()
            .reply(bulk_array(&["name", "age"]))
            .reply(RespValue::Integer(2))
            .reply(RespValue::simple("object"));

        let frames = query_json_objkeys(&model("json.objkeys", "."), &client).unwrap();
        assert_eq!(frames[0].columns[0].values, ColumnValues::from(vec!["name", "age"]));

        let frames = query_json_scalar(&model("json.objlen", "."), &client).unwrap();
        assert_eq!(frames[0].columns[0].values, ColumnValues::Float64(vec![2.0]));

        let frames = query_json_scalar(&model("json.type", ""), &client).unwrap();
        assert_eq!(frames[0].columns[0].values, ColumnValues::from(vec!["object"]));

        assert_eq!(
            client.calls(),
            vec![
                vec!["JSON.OBJKEYS".to_string(), "doc".into(), ".".into()],
                vec!["JSON.OBJLEN".to_string(), "doc".into(), ".".into()],
                vec!["JSON.TYPE".to_string(), "doc".into()],
            ]
        );
    }
}
