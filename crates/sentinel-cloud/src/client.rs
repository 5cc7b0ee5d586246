use aws_config::{BehaviorVersion, Region};

/// Service clients sharing one loaded AWS configuration.
#[derive(Clone)]
pub struct AwsClients {
    pub rekognition: aws_sdk_rekognition::Client,
    pub s3: aws_sdk_s3::Client,
}

/// Load credentials and settings from the default provider chain, pinned to `region`.
pub async fn aws_clients(region: &str) -> AwsClients {
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;

    tracing::info!(region, "AWS clients configured");

    AwsClients {
        rekognition: aws_sdk_rekognition::Client::new(&shared),
        s3: aws_sdk_s3::Client::new(&shared),
    }
}
