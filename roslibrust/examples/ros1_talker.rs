// Message types are normally produced by `roslibrust_codegen` from `.msg`
// files (out of scope for this crate); here we hand-write the one type we
// need so the example has no other dependencies.
#[cfg(feature = "ros1")]
#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
struct StringMsg {
    data: String,
}

#[cfg(feature = "ros1")]
impl roslibrust::RosMessageType for StringMsg {
    const ROS_TYPE_NAME: &'static str = "std_msgs/String";
    const MD5SUM: &'static str = "992ce8a1687cec8c8bd883ec73ca41d1";
    const DEFINITION: &'static str = "string data";
}

#[cfg(feature = "ros1")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use roslibrust::ros1::NodeHandle;

    env_logger::init();

    let nh = NodeHandle::new("http://localhost:11311", "/talker_rs").await?;
    let publisher = nh.advertise::<StringMsg>("/chatter", 1, false).await?;

    let mut count = 0u32;
    loop {
        let msg = StringMsg {
            data: format!("hello world {count}"),
        };
        publisher.publish(&msg).await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        count += 1;
    }
}

#[cfg(not(feature = "ros1"))]
fn main() {
    eprintln!("This example does nothing without compiling with the feature 'ros1'");
}
