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

    {
        let nh = NodeHandle::new("http://localhost:11311", "/listener_rs").await?;
        let mut subscriber = nh.subscribe::<StringMsg>("/chatter", 1).await?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::warn!("ctrl-c, exiting");
                    break;
                }
                msg = subscriber.next() => {
                    match msg {
                        Ok(msg) => log::info!("[/listener_rs] Got message: {}", msg.data),
                        Err(e) => log::warn!("subscription error: {e}"),
                    }
                }
            }
        }
    }
    log::info!("done with subscribing, letting subscription unregister");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    Ok(())
}

#[cfg(not(feature = "ros1"))]
fn main() {
    eprintln!("This example does nothing without compiling with the feature 'ros1'");
}
