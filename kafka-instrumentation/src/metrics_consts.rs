// ==== Producer metrics ====
/// Counter for records produced, partitioned by outcome
pub const PRODUCER_MESSAGES_COUNT: &str = "producer.messages.count";
pub const PRODUCER_MESSAGES_COUNT_DESCRIPTION: &str = "The number of messages produced";

/// Counter for post-compression bytes of successfully produced records
pub const PRODUCER_WIRE_BYTES: &str = "producer.messages.wire.bytes";
pub const PRODUCER_WIRE_BYTES_DESCRIPTION: &str = "The number of bytes produced";

/// Counter for pre-compression bytes of successfully produced records
pub const PRODUCER_UNCOMPRESSED_BYTES: &str = "producer.messages.uncompressed.bytes";
pub const PRODUCER_UNCOMPRESSED_BYTES_DESCRIPTION: &str =
    "The number of uncompressed bytes produced";

/// Histogram for producer broker round trips, per request type
pub const PRODUCER_RPC_LATENCY: &str = "messaging.kafka.write.latency";
pub const PRODUCER_RPC_LATENCY_DESCRIPTION: &str =
    "Time it took to write a batch including wait time before writing";

// ==== Consumer metrics ====
/// Counter for records fetched from a topic
pub const CONSUMER_MESSAGES_FETCHED: &str = "consumer.messages.fetched";
pub const CONSUMER_MESSAGES_FETCHED_DESCRIPTION: &str =
    "The number of messages that were fetched from a kafka topic";

/// Histogram for the time between a record being produced and fetched
pub const CONSUMER_MESSAGES_DELAY: &str = "consumer.messages.delay";
pub const CONSUMER_MESSAGES_DELAY_DESCRIPTION: &str =
    "The delay between producing messages and reading them";

/// Histogram for consumer broker round trips, per request type
pub const CONSUMER_RPC_LATENCY: &str = "messaging.kafka.read.latency";
pub const CONSUMER_RPC_LATENCY_DESCRIPTION: &str =
    "Time it took to read a batch including wait time before reading";

/// Bucket bounds shared by every histogram so delay and latency series are comparable.
pub const HISTOGRAM_BUCKETS: &[f64] = &[
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

// ==== Attribute keys ====
pub const MESSAGING_SYSTEM_KEY: &str = "messaging.system";
pub const MESSAGING_SYSTEM: &str = "kafka";
pub const NAMESPACE_KEY: &str = "namespace";
pub const TOPIC_KEY: &str = "topic";
pub const DESTINATION_NAME_KEY: &str = "messaging.destination.name";
pub const DESTINATION_PARTITION_KEY: &str = "messaging.kafka.destination.partition";
pub const SOURCE_NAME_KEY: &str = "messaging.source.name";
pub const SOURCE_PARTITION_KEY: &str = "messaging.kafka.source.partition";
pub const OUTCOME_KEY: &str = "outcome";
pub const ERROR_REASON_KEY: &str = "error_reason";
pub const COMPRESSION_CODEC_KEY: &str = "compression.codec";
pub const OPERATION_KEY: &str = "operation";

/// Keys derived from protocol metadata. A dynamic topic attribute can never override them.
pub const RESERVED_KEYS: &[&str] = &[
    MESSAGING_SYSTEM_KEY,
    NAMESPACE_KEY,
    TOPIC_KEY,
    DESTINATION_NAME_KEY,
    DESTINATION_PARTITION_KEY,
    SOURCE_NAME_KEY,
    SOURCE_PARTITION_KEY,
    OUTCOME_KEY,
    ERROR_REASON_KEY,
    COMPRESSION_CODEC_KEY,
    OPERATION_KEY,
];
