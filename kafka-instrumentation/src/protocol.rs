use rdkafka::error::{KafkaError, RDKafkaErrorCode};

/// Kafka protocol error codes that brokers report on produce and fetch responses.
/// Only the codes a client can plausibly see on the record path are listed, anything
/// else is classified as an unknown failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KafkaErrorCode {
    UnknownServerError,
    OffsetOutOfRange,
    CorruptMessage,
    UnknownTopicOrPartition,
    InvalidFetchSize,
    LeaderNotAvailable,
    NotLeaderOrFollower,
    RequestTimedOut,
    BrokerNotAvailable,
    ReplicaNotAvailable,
    MessageTooLarge,
    NetworkException,
    InvalidTopicException,
    RecordListTooLarge,
    NotEnoughReplicas,
    NotEnoughReplicasAfterAppend,
    InvalidRequiredAcks,
    TopicAuthorizationFailed,
    ClusterAuthorizationFailed,
    UnsupportedCompressionType,
    ThrottlingQuotaExceeded,
}

impl KafkaErrorCode {
    pub fn from_code(code: i16) -> Option<Self> {
        let known = match code {
            -1 => Self::UnknownServerError,
            1 => Self::OffsetOutOfRange,
            2 => Self::CorruptMessage,
            3 => Self::UnknownTopicOrPartition,
            4 => Self::InvalidFetchSize,
            5 => Self::LeaderNotAvailable,
            6 => Self::NotLeaderOrFollower,
            7 => Self::RequestTimedOut,
            8 => Self::BrokerNotAvailable,
            9 => Self::ReplicaNotAvailable,
            10 => Self::MessageTooLarge,
            13 => Self::NetworkException,
            17 => Self::InvalidTopicException,
            18 => Self::RecordListTooLarge,
            19 => Self::NotEnoughReplicas,
            20 => Self::NotEnoughReplicasAfterAppend,
            21 => Self::InvalidRequiredAcks,
            29 => Self::TopicAuthorizationFailed,
            31 => Self::ClusterAuthorizationFailed,
            76 => Self::UnsupportedCompressionType,
            89 => Self::ThrottlingQuotaExceeded,
            _ => return None,
        };
        Some(known)
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageTooLarge => 10,
            Self::NetworkException => 13,
            Self::InvalidTopicException => 17,
            Self::RecordListTooLarge => 18,
            Self::NotEnoughReplicas => 19,
            Self::NotEnoughReplicasAfterAppend => 20,
            Self::InvalidRequiredAcks => 21,
            Self::TopicAuthorizationFailed => 29,
            Self::ClusterAuthorizationFailed => 31,
            Self::UnsupportedCompressionType => 76,
            Self::ThrottlingQuotaExceeded => 89,
        }
    }

    /// The canonical human readable message the Kafka protocol attaches to this code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownServerError => {
                "The server experienced an unexpected error when processing the request."
            }
            Self::OffsetOutOfRange => {
                "The requested offset is not within the range of offsets maintained by the server."
            }
            Self::CorruptMessage => "This message has failed its CRC checksum, exceeds the valid size, has a null key for a compacted topic, or is otherwise corrupt.",
            Self::UnknownTopicOrPartition => "This server does not host this topic-partition.",
            Self::InvalidFetchSize => "The requested fetch size is invalid.",
            Self::LeaderNotAvailable => "There is no leader for this topic-partition as we are in the middle of a leadership election.",
            Self::NotLeaderOrFollower => "For requests intended only for the leader, this error indicates that the broker is not the current leader. For requests intended for any replica, this error indicates that the broker is not a replica of the topic partition.",
            Self::RequestTimedOut => "The request timed out.",
            Self::BrokerNotAvailable => "The broker is not available.",
            Self::ReplicaNotAvailable => "The replica is not available for the requested topic-partition. Produce/Fetch requests and other requests intended only for the leader or follower return NOT_LEADER_OR_FOLLOWER if the broker is not a replica of the topic-partition.",
            Self::MessageTooLarge => "The request included a message larger than the max message size the server will accept.",
            Self::NetworkException => "The server disconnected before a response was received.",
            Self::InvalidTopicException => {
                "The request attempted to perform an operation on an invalid topic."
            }
            Self::RecordListTooLarge => "The request included message batch larger than the configured segment size on the server.",
            Self::NotEnoughReplicas => {
                "Messages are rejected since there are fewer in-sync replicas than required."
            }
            Self::NotEnoughReplicasAfterAppend => {
                "Messages are written to the log, but to fewer in-sync replicas than required."
            }
            Self::InvalidRequiredAcks => {
                "Produce request specified an invalid value for required acks."
            }
            Self::TopicAuthorizationFailed => "Topic authorization failed.",
            Self::ClusterAuthorizationFailed => "Cluster authorization failed.",
            Self::UnsupportedCompressionType => {
                "The requesting client does not support the compression type of given partition."
            }
            Self::ThrottlingQuotaExceeded => "The throttling quota has been exceeded.",
        }
    }
}

/// Errors surfaced by a broker client that may carry a structured protocol error code.
pub trait BrokerError {
    fn protocol_code(&self) -> Option<KafkaErrorCode>;
}

impl<T: BrokerError + ?Sized> BrokerError for &T {
    fn protocol_code(&self) -> Option<KafkaErrorCode> {
        (**self).protocol_code()
    }
}

impl BrokerError for KafkaError {
    fn protocol_code(&self) -> Option<KafkaErrorCode> {
        self.rdkafka_error_code().and_then(broker_code)
    }
}

// librdkafka local errors (negative codes) map to a protocol code only when they stand
// for the broker's answer, as unknown topics and partitions do once metadata settled.
fn broker_code(code: RDKafkaErrorCode) -> Option<KafkaErrorCode> {
    let known = match code {
        RDKafkaErrorCode::UnknownTopicOrPartition
        | RDKafkaErrorCode::UnknownTopic
        | RDKafkaErrorCode::UnknownPartition => KafkaErrorCode::UnknownTopicOrPartition,
        RDKafkaErrorCode::MessageSizeTooLarge => KafkaErrorCode::MessageTooLarge,
        RDKafkaErrorCode::LeaderNotAvailable => KafkaErrorCode::LeaderNotAvailable,
        RDKafkaErrorCode::NotLeaderForPartition => KafkaErrorCode::NotLeaderOrFollower,
        RDKafkaErrorCode::RequestTimedOut => KafkaErrorCode::RequestTimedOut,
        RDKafkaErrorCode::BrokerNotAvailable => KafkaErrorCode::BrokerNotAvailable,
        RDKafkaErrorCode::NetworkException => KafkaErrorCode::NetworkException,
        RDKafkaErrorCode::InvalidTopic => KafkaErrorCode::InvalidTopicException,
        RDKafkaErrorCode::NotEnoughReplicas => KafkaErrorCode::NotEnoughReplicas,
        RDKafkaErrorCode::NotEnoughReplicasAfterAppend => {
            KafkaErrorCode::NotEnoughReplicasAfterAppend
        }
        RDKafkaErrorCode::TopicAuthorizationFailed => KafkaErrorCode::TopicAuthorizationFailed,
        _ => return None,
    };
    Some(known)
}
