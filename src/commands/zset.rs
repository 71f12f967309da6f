//! Sorted sets: `ZRANGE … WITHSCORES`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{Column, ColumnValues, Frame};
use crate::query::QueryModel;

use super::string_list;

/// `ZRANGE key min max [BYSCORE|BYLEX|REV] WITHSCORES`: a single-row frame
/// with one column per member holding its score.
pub fn query_zrange(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let mut args: Vec<FlatArg> = vec![FlatArg::from(&qm.min), FlatArg::from(&qm.max)];
    if !qm.z_range_query.is_empty() {
        args.push(FlatArg::from(&qm.z_range_query));
    }
    args.push("WITHSCORES".into());

    let reply = client.run_flat_cmd("ZRANGE", &qm.key_name, &args)?;

    let mut frame = Frame::new(&qm.command);
    for pair in string_list(&reply).chunks_exact(2) {
        let values = match pair[1].parse::<f64>() {
            Ok(score) => ColumnValues::Float64(vec![score]),
            Err(_) => ColumnValues::String(vec![pair[1].clone()]),
        };
        frame.push_column(Column::new(pair[0].as_str(), values));
    }
    Ok(vec![frame])
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk_array, ScriptedClient};
    use crate::resp::types::RespValue;

    fn model(min: &str, max: &str, variant: &str) -> QueryModel {
        QueryModel {
            command: "zrange".into(),
            key_name: "scores".into(),
            min: min.into(),
            max: max.into(),
            z_range_query: variant.into(),
            ..QueryModel::default()
        }
    }

    #[test]
    fn members_become_columns() {
        let client = ScriptedClient::new().reply(bulk_array(&["alice", "12.5", "bob", "30", "carol", "inf"]));
        let frames = query_zrange(&model("0", "-1", ""), &client).unwrap();
        assert_eq!(client.first_call(), vec!["ZRANGE", "scores", "0", "-1", "WITHSCORES"]);

        let frame = &frames[0];
        assert_eq!(frame.name, "zrange");
        assert_eq!(frame.rows(), 1);
        let names: Vec<_> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(frame.columns[1].values, ColumnValues::Float64(vec![30.0]));
        assert_eq!(frame.columns[2].values, ColumnValues::Float64(vec![f64::INFINITY]));
    }

    #[test]
    fn variant_is_passed_verbatim() {
        let client = ScriptedClient::new().reply(bulk_array(&["x", "not-a-score"]));
        let frames = query_zrange(&model("(1", "+inf", "BYSCORE"), &client).unwrap();
        assert_eq!(
            client.first_call(),
            vec!["ZRANGE", "scores", "(1", "+inf", "BYSCORE", "WITHSCORES"]
        );
        assert_eq!(frames[0].columns[0].values, ColumnValues::from(vec!["not-a-score"]));
    }

    #[test]
    fn empty_set() {
        let client = ScriptedClient::new().reply(RespValue::Array(vec![]));
        let frames = query_zrange(&model("0", "-1", ""), &client).unwrap();
        assert!(frames[0].columns.is_empty());
    }
}
