//! The service-advertising side of the ROS1 TCPROS service protocol (spec
//! §3 `ServiceProvider`, named but elided from the distilled §4). Grounded
//! on the same standard TCPROS service convention as `service_client.rs`,
//! mirrored onto the `tcp_accept_task`-per-connection style the teacher
//! uses for topic publication (`publisher.rs`/`Publication::accept_task`).

use crate::names::Name;
use crate::tcpros::{self, ConnectionHeader};
use abort_on_drop::ChildTask;
use roslibrust_common::{RosServiceType, ServiceFn};
use std::net::{IpAddr, SocketAddr};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Owns the listener task for one advertised service.
pub(crate) struct ServiceServer {
    port: u16,
    _accept_task: ChildTask<()>,
}

impl ServiceServer {
    pub(crate) async fn new<T, F>(
        caller_id: Name,
        service_name: String,
        bind_ip: IpAddr,
        server: F,
    ) -> std::io::Result<Self>
    where
        T: RosServiceType,
        F: ServiceFn<T>,
    {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from((bind_ip, 0))).await?;
        let port = listener.local_addr()?.port();

        let accept_task = tokio::spawn(Self::accept_loop::<T, F>(
            listener,
            caller_id,
            service_name,
            server,
        ));

        Ok(Self {
            port,
            _accept_task: accept_task.into(),
        })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    async fn accept_loop<T, F>(
        listener: tokio::net::TcpListener,
        caller_id: Name,
        service_name: String,
        server: F,
    ) where
        T: RosServiceType,
        F: ServiceFn<T>,
    {
        log::debug!("service accept task started for {service_name}");
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("accept failed on service {service_name}: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            };
            if let Err(e) = Self::serve_connection::<T, F>(
                stream,
                &caller_id,
                &service_name,
                &server,
            )
            .await
            {
                log::debug!("service connection from {peer_addr} on {service_name} ended: {e}");
            }
        }
    }

    async fn serve_connection<T, F>(
        mut stream: TcpStream,
        caller_id: &Name,
        service_name: &str,
        server: &F,
    ) -> crate::error::Result<()>
    where
        T: RosServiceType,
        F: ServiceFn<T>,
    {
        let request_header = tcpros::receive_header(&mut stream).await?;
        let peer_md5 = request_header.md5sum.as_deref().unwrap_or("");
        if peer_md5 != "*" && T::MD5SUM != "*" && peer_md5 != T::MD5SUM {
            let error_header = ConnectionHeader {
                error: Some(format!(
                    "md5sums do not match: expected {}, got {:?}",
                    T::MD5SUM,
                    request_header.md5sum
                )),
                ..Default::default()
            };
            stream.write_all(&error_header.to_bytes()?).await?;
            return Ok(());
        }

        let response_header = ConnectionHeader {
            caller_id: caller_id.to_string(),
            service: Some(service_name.to_string()),
            topic_type: T::ROS_SERVICE_NAME.to_string(),
            md5sum: Some(T::MD5SUM.to_string()),
            persistent: request_header.persistent,
            ..Default::default()
        };
        stream.write_all(&response_header.to_bytes()?).await?;

        loop {
            let body = match tcpros::read_frame(&mut stream).await {
                Ok(body) => body,
                Err(_) => return Ok(()),
            };
            let request: T::Request = roslibrust_serde_rosmsg::from_slice(&body)?;
            let response = server(request);
            match response {
                Ok(response) => {
                    stream.write_all(&[1u8]).await?;
                    let body = roslibrust_serde_rosmsg::to_vec(&response)?;
                    tcpros::write_frame(&mut stream, &body).await?;
                }
                Err(e) => {
                    stream.write_all(&[0u8]).await?;
                    tcpros::write_frame(&mut stream, e.to_string().as_bytes()).await?;
                }
            }
            if !request_header.persistent {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use roslibrust_common::RosMessageType;
    use tokio::io::AsyncReadExt;

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct AddTwoIntsRequest {
        a: i64,
        b: i64,
    }
    impl RosMessageType for AddTwoIntsRequest {
        const ROS_TYPE_NAME: &'static str = "roscpp_tutorials/AddTwoIntsRequest";
        const MD5SUM: &'static str = "test-md5";
    }

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct AddTwoIntsResponse {
        sum: i64,
    }
    impl RosMessageType for AddTwoIntsResponse {
        const ROS_TYPE_NAME: &'static str = "roscpp_tutorials/AddTwoIntsResponse";
        const MD5SUM: &'static str = "test-md5";
    }

    struct AddTwoInts;
    impl RosServiceType for AddTwoInts {
        const ROS_SERVICE_NAME: &'static str = "roscpp_tutorials/AddTwoInts";
        const MD5SUM: &'static str = "test-md5";
        type Request = AddTwoIntsRequest;
        type Response = AddTwoIntsResponse;
    }

    #[tokio::test]
    async fn serves_one_call_on_a_non_persistent_connection() {
        let caller_id = Name::new("/test_service_provider").unwrap();
        let server = ServiceServer::new::<AddTwoInts, _>(
            caller_id,
            "/add_two_ints".to_string(),
            IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            |req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }),
        )
        .await
        .unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", server.port()))
            .await
            .unwrap();
        let header = ConnectionHeader {
            caller_id: "/caller".to_string(),
            service: Some("/add_two_ints".to_string()),
            topic_type: AddTwoInts::ROS_SERVICE_NAME.to_string(),
            md5sum: Some(AddTwoInts::MD5SUM.to_string()),
            persistent: false,
            ..Default::default()
        };
        tcpros::send_header(&mut stream, &header).await.unwrap();
        let response_header = tcpros::receive_header(&mut stream).await.unwrap();
        assert!(response_header.error.is_none());

        let body = roslibrust_serde_rosmsg::to_vec(&AddTwoIntsRequest { a: 2, b: 3 }).unwrap();
        tcpros::write_frame(&mut stream, &body).await.unwrap();

        let mut ok_byte = [0u8; 1];
        stream.read_exact(&mut ok_byte).await.unwrap();
        assert_eq!(ok_byte[0], 1);
        let response_body = tcpros::read_frame(&mut stream).await.unwrap();
        let response: AddTwoIntsResponse = roslibrust_serde_rosmsg::from_slice(&response_body).unwrap();
        assert_eq!(response.sum, 5);
    }

    #[tokio::test]
    async fn rejects_mismatched_md5sum() {
        let caller_id = Name::new("/test_service_provider").unwrap();
        let server = ServiceServer::new::<AddTwoInts, _>(
            caller_id,
            "/add_two_ints".to_string(),
            IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            |req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }),
        )
        .await
        .unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", server.port()))
            .await
            .unwrap();
        let header = ConnectionHeader {
            caller_id: "/caller".to_string(),
            service: Some("/add_two_ints".to_string()),
            topic_type: AddTwoInts::ROS_SERVICE_NAME.to_string(),
            md5sum: Some("wrong".to_string()),
            persistent: false,
            ..Default::default()
        };
        tcpros::send_header(&mut stream, &header).await.unwrap();
        let response_header = tcpros::receive_header(&mut stream).await.unwrap();
        assert!(response_header.error.unwrap().contains("md5sums do not match"));
    }
}
