//! Typed access actions and their expansion into IAM action strings.

use serde::{Deserialize, Serialize};

use reviewstack_core::ResourceKind;

/// One unit of access a grantee can hold on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TableRead,
    TableWrite,
    QueueSend,
    QueueConsume,
    TopicPublish,
    FunctionInvoke,
    ObjectRead,
    ObjectWrite,
    ModelInvoke,
}

pub const TABLE_READ_WRITE: &[Action] = &[Action::TableRead, Action::TableWrite];
pub const OBJECT_READ_WRITE: &[Action] = &[Action::ObjectRead, Action::ObjectWrite];

impl Action {
    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        let expected = match self {
            Action::TableRead | Action::TableWrite => ResourceKind::Table,
            Action::QueueSend | Action::QueueConsume => ResourceKind::Queue,
            Action::TopicPublish => ResourceKind::Topic,
            Action::FunctionInvoke => ResourceKind::Function,
            Action::ObjectRead | Action::ObjectWrite => ResourceKind::Bucket,
            Action::ModelInvoke => ResourceKind::External,
        };
        kind == expected
    }

    pub fn iam_actions(&self) -> &'static [&'static str] {
        match self {
            Action::TableRead => &[
                "dynamodb:BatchGetItem",
                "dynamodb:ConditionCheckItem",
                "dynamodb:DescribeTable",
                "dynamodb:GetItem",
                "dynamodb:GetRecords",
                "dynamodb:GetShardIterator",
                "dynamodb:Query",
                "dynamodb:Scan",
            ],
            Action::TableWrite => &[
                "dynamodb:BatchWriteItem",
                "dynamodb:DeleteItem",
                "dynamodb:DescribeTable",
                "dynamodb:PutItem",
                "dynamodb:UpdateItem",
            ],
            Action::QueueSend => &[
                "sqs:GetQueueAttributes",
                "sqs:GetQueueUrl",
                "sqs:SendMessage",
            ],
            Action::QueueConsume => &[
                "sqs:ChangeMessageVisibility",
                "sqs:DeleteMessage",
                "sqs:GetQueueAttributes",
                "sqs:GetQueueUrl",
                "sqs:ReceiveMessage",
            ],
            Action::TopicPublish => &["sns:Publish"],
            Action::FunctionInvoke => &["lambda:InvokeFunction"],
            Action::ObjectRead => &["s3:GetBucket*", "s3:GetObject*", "s3:List*"],
            Action::ObjectWrite => &[
                "s3:Abort*",
                "s3:DeleteObject*",
                "s3:PutObject",
                "s3:PutObjectLegalHold",
                "s3:PutObjectRetention",
                "s3:PutObjectTagging",
                "s3:PutObjectVersionTagging",
            ],
            Action::ModelInvoke => &["bedrock:InvokeModel"],
        }
    }
}

/// ARNs a statement must cover for a resource: tables include their
/// indexes, buckets include their objects.
pub fn statement_resources(kind: ResourceKind, arn: &str) -> Vec<String> {
    match kind {
        ResourceKind::Table => vec![arn.to_string(), format!("{arn}/index/*")],
        ResourceKind::Bucket => vec![arn.to_string(), format!("{arn}/*")],
        _ => vec![arn.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_actions_only_apply_to_queues() {
        assert!(Action::QueueSend.applies_to(ResourceKind::Queue));
        assert!(!Action::QueueSend.applies_to(ResourceKind::Table));
        assert!(!Action::TableRead.applies_to(ResourceKind::Queue));
    }

    #[test]
    fn send_and_consume_differ() {
        assert!(Action::QueueSend.iam_actions().contains(&"sqs:SendMessage"));
        assert!(!Action::QueueSend.iam_actions().contains(&"sqs:ReceiveMessage"));
        assert!(Action::QueueConsume.iam_actions().contains(&"sqs:ReceiveMessage"));
    }

    #[test]
    fn table_statements_cover_indexes() {
        let resources = statement_resources(ResourceKind::Table, "arn:t");
        assert_eq!(resources, vec!["arn:t".to_string(), "arn:t/index/*".to_string()]);
    }
}
