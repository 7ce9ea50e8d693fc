//! Inline IAM policy resources shared by the builders.

use finsight_plan::{Resource, ResourceKind, Value};

/// Grant `roles` read access to one secret.
pub fn secret_read_policy(id: &str, secret_arn: Value, roles: Vec<Value>) -> Resource {
    policy(
        id,
        statement(
            vec!["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
            secret_arn,
        ),
        roles,
    )
}

/// Grant `roles` permission to send mail from exactly `from_address`.
pub fn send_email_policy(id: &str, from_address: &str, roles: Vec<Value>) -> Resource {
    let mut statement = statement(vec!["ses:SendEmail", "ses:SendRawEmail"], Value::from("*"));
    if let Value::Map(entries) = &mut statement {
        entries.insert(
            "Condition".into(),
            Value::map([(
                "StringEquals",
                Value::map([("ses:FromAddress", from_address)]),
            )]),
        );
    }
    policy(id, statement, roles)
}

fn statement(actions: Vec<&str>, resource: Value) -> Value {
    Value::map([
        ("Effect", Value::from("Allow")),
        ("Action", Value::list(actions)),
        ("Resource", resource),
    ])
}

fn policy(id: &str, statement: Value, roles: Vec<Value>) -> Resource {
    Resource::new(id, ResourceKind::IamPolicy)
        .prop("PolicyName", id)
        .prop(
            "PolicyDocument",
            Value::map([
                ("Version", Value::from("2012-10-17")),
                ("Statement", Value::list(vec![statement])),
            ]),
        )
        .prop("Roles", Value::list(roles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_email_policy_is_conditioned_on_sender() {
        let policy = send_email_policy("SesSendPolicy", "noreply@finsight.local", vec![Value::from("role")]);
        let statement = &policy.property("PolicyDocument").unwrap().get("Statement").unwrap().as_list().unwrap()[0];
        assert_eq!(
            statement
                .get("Condition")
                .and_then(|c| c.get("StringEquals"))
                .and_then(|c| c.get("ses:FromAddress"))
                .and_then(Value::as_str),
            Some("noreply@finsight.local")
        );
        assert_eq!(statement.get("Action").and_then(Value::as_list).map(|a| a.len()), Some(2));
    }
}
