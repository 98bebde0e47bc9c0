//! The XML-RPC client fleet, collapsed onto the master slot (client index 0
//! of the original spec).
//!
//! Every method here is an ordinary `.await`ed HTTP round trip; FIFO
//! ordering of master-slot calls (spec §5, §4.2) is obtained by the
//! [`crate::node::actor::NodeServer`] actor holding exactly one
//! `MasterClient` and awaiting each call to completion before starting the
//! next, rather than by an explicit queue data structure.

use crate::error::Result;
use crate::param::XmlrpcParam;
use crate::rpc;
use crate::xmlrpc::ApiMethod;

/// A published topic name/type pair, as returned by `getPublishedTopics`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicInfo {
    pub name: String,
    pub topic_type: String,
}

/// The result of a successful `registerPublisher`/`registerSubscriber` call:
/// the list of xmlrpc URIs of nodes already publishing the topic.
pub type PublisherUris = Vec<String>;

pub(crate) struct MasterClient {
    http: reqwest::Client,
    master_uri: String,
    caller_id: String,
}

impl MasterClient {
    pub(crate) fn new(master_uri: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            master_uri: master_uri.into(),
            caller_id: caller_id.into(),
        }
    }

    async fn call(&self, method: ApiMethod, params: Vec<XmlrpcParam>) -> Result<XmlrpcParam> {
        rpc::call(&self.http, &self.master_uri, method, params).await
    }

    fn caller_id_param(&self) -> XmlrpcParam {
        XmlrpcParam::String(self.caller_id.clone())
    }

    pub(crate) async fn register_publisher(
        &self,
        topic: &str,
        topic_type: &str,
        my_xmlrpc_uri: &str,
    ) -> Result<PublisherUris> {
        let value = self
            .call(
                ApiMethod::RegisterPublisher,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(topic.to_string()),
                    XmlrpcParam::String(topic_type.to_string()),
                    XmlrpcParam::String(my_xmlrpc_uri.to_string()),
                ],
            )
            .await?;
        Ok(string_array(&value))
    }

    pub(crate) async fn unregister_publisher(
        &self,
        topic: &str,
        my_xmlrpc_uri: &str,
    ) -> Result<()> {
        self.call(
            ApiMethod::UnregisterPublisher,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(topic.to_string()),
                XmlrpcParam::String(my_xmlrpc_uri.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn register_subscriber(
        &self,
        topic: &str,
        topic_type: &str,
        my_xmlrpc_uri: &str,
    ) -> Result<PublisherUris> {
        let value = self
            .call(
                ApiMethod::RegisterSubscriber,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(topic.to_string()),
                    XmlrpcParam::String(topic_type.to_string()),
                    XmlrpcParam::String(my_xmlrpc_uri.to_string()),
                ],
            )
            .await?;
        Ok(string_array(&value))
    }

    pub(crate) async fn unregister_subscriber(
        &self,
        topic: &str,
        my_xmlrpc_uri: &str,
    ) -> Result<()> {
        self.call(
            ApiMethod::UnregisterSubscriber,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(topic.to_string()),
                XmlrpcParam::String(my_xmlrpc_uri.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn register_service(
        &self,
        service: &str,
        service_uri: &str,
        my_xmlrpc_uri: &str,
    ) -> Result<()> {
        self.call(
            ApiMethod::RegisterService,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(service.to_string()),
                XmlrpcParam::String(service_uri.to_string()),
                XmlrpcParam::String(my_xmlrpc_uri.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn unregister_service(
        &self,
        service: &str,
        service_uri: &str,
    ) -> Result<()> {
        self.call(
            ApiMethod::UnregisterService,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(service.to_string()),
                XmlrpcParam::String(service_uri.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Used as the keep-alive ping (spec §4.6). Returns the master's PID.
    pub(crate) async fn get_pid(&self) -> Result<i32> {
        let value = self
            .call(ApiMethod::GetPid, vec![self.caller_id_param()])
            .await?;
        value
            .as_int()
            .ok_or_else(|| crate::error::Error::Protocol("getPid response was not an int".into()))
    }

    pub(crate) async fn get_published_topics(&self, subgraph: &str) -> Result<Vec<TopicInfo>> {
        let value = self
            .call(
                ApiMethod::GetPublishedTopics,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(subgraph.to_string()),
                ],
            )
            .await?;
        Ok(value
            .as_array()
            .unwrap_or(&[])
            .iter()
            .filter_map(|entry| {
                let pair = entry.as_array()?;
                Some(TopicInfo {
                    name: pair.first()?.as_str()?.to_string(),
                    topic_type: pair.get(1)?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    pub(crate) async fn get_topic_types(&self) -> Result<Vec<TopicInfo>> {
        let value = self
            .call(ApiMethod::GetTopicTypes, vec![self.caller_id_param()])
            .await?;
        Ok(value
            .as_array()
            .unwrap_or(&[])
            .iter()
            .filter_map(|entry| {
                let pair = entry.as_array()?;
                Some(TopicInfo {
                    name: pair.first()?.as_str()?.to_string(),
                    topic_type: pair.get(1)?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    pub(crate) async fn get_uri(&self) -> Result<String> {
        let value = self.call(ApiMethod::GetUri, vec![self.caller_id_param()]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub(crate) async fn lookup_node(&self, node_name: &str) -> Result<String> {
        let value = self
            .call(
                ApiMethod::LookupNode,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(node_name.to_string()),
                ],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub(crate) async fn lookup_service(&self, service: &str) -> Result<String> {
        let value = self
            .call(
                ApiMethod::LookupService,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(service.to_string()),
                ],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub(crate) async fn get_system_state(&self) -> Result<XmlrpcParam> {
        self.call(ApiMethod::GetSystemState, vec![self.caller_id_param()])
            .await
    }

    pub(crate) async fn get_param(&self, key: &str) -> Result<XmlrpcParam> {
        self.call(
            ApiMethod::GetParam,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(key.to_string()),
            ],
        )
        .await
    }

    pub(crate) async fn set_param(&self, key: &str, value: XmlrpcParam) -> Result<()> {
        self.call(
            ApiMethod::SetParam,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(key.to_string()),
                value,
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn has_param(&self, key: &str) -> Result<bool> {
        let value = self
            .call(
                ApiMethod::HasParam,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(key.to_string()),
                ],
            )
            .await?;
        Ok(matches!(value, XmlrpcParam::Bool(true)))
    }

    pub(crate) async fn delete_param(&self, key: &str) -> Result<()> {
        self.call(
            ApiMethod::DeleteParam,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(key.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn search_param(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .call(
                ApiMethod::SearchParam,
                vec![
                    self.caller_id_param(),
                    XmlrpcParam::String(key.to_string()),
                ],
            )
            .await?;
        Ok(value.as_str().map(str::to_string).filter(|s| !s.is_empty()))
    }

    pub(crate) async fn subscribe_param(
        &self,
        my_xmlrpc_uri: &str,
        key: &str,
    ) -> Result<XmlrpcParam> {
        self.call(
            ApiMethod::SubscribeParam,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(my_xmlrpc_uri.to_string()),
                XmlrpcParam::String(key.to_string()),
            ],
        )
        .await
    }

    pub(crate) async fn unsubscribe_param(&self, my_xmlrpc_uri: &str, key: &str) -> Result<()> {
        self.call(
            ApiMethod::UnsubscribeParam,
            vec![
                self.caller_id_param(),
                XmlrpcParam::String(my_xmlrpc_uri.to_string()),
                XmlrpcParam::String(key.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn get_param_names(&self) -> Result<Vec<String>> {
        let value = self
            .call(ApiMethod::GetParamNames, vec![self.caller_id_param()])
            .await?;
        Ok(string_array(&value))
    }
}

fn string_array(value: &XmlrpcParam) -> Vec<String> {
    value
        .as_array()
        .unwrap_or(&[])
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_array_skips_non_string_entries() {
        let value = XmlrpcParam::Array(vec![
            XmlrpcParam::String("/talker".to_string()),
            XmlrpcParam::Int(3),
            XmlrpcParam::String("/listener".to_string()),
        ]);
        assert_eq!(
            string_array(&value),
            vec!["/talker".to_string(), "/listener".to_string()]
        );
    }

    #[test]
    fn string_array_on_non_array_is_empty() {
        assert!(string_array(&XmlrpcParam::Int(1)).is_empty());
    }
}
