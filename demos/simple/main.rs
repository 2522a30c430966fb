use std::collections::HashMap;

use optable::{FileStore, SdkConfig};

pub fn main() {
    env_logger::init();

    let host = std::env::var("OPTABLE_HOST").unwrap();
    let app = std::env::var("OPTABLE_APP").unwrap();

    // Keep the visitor passport and targeting cache across runs.
    let storage = FileStore::open(std::env::temp_dir().join("optable-demo.json")).unwrap();

    let sdk = SdkConfig::new(host, app)
        .storage(storage)
        .to_sdk()
        .unwrap();

    // Optional. Other calls may be made right away.
    println!("init: {:?}", sdk.wait_for_init_blocking().message());

    let identify = sdk
        .identify_email("user@example.com", false, None)
        .blocking_wait();
    println!("identify: {:?}", identify.message());

    sdk.witness(
        "app.screenView",
        HashMap::from([("screen".to_owned(), "home".into())]),
    )
    .blocking_wait();

    match sdk.targeting().blocking_wait().success() {
        Some(targeting) => println!("targeting: {:?}", targeting),
        // Fall back to the last successful response.
        None => println!("cached targeting: {:?}", sdk.targeting_from_cache()),
    }
}
