//! The master/slave XML-RPC method table.
//!
//! Ported from `getMethodName`/`getMethodCode`/`isRosMasterApi`/
//! `isRosSlaveApi` in the original node's `cros_api.c`. Every method that
//! table recognizes is implemented somewhere in this crate: the ones the
//! distilled spec didn't name (`lookupNode`, `getTopicTypes`,
//! `getSystemState`, `getUri`, `lookupService`) are still master-API calls
//! this node can issue, and `getBusStats`/`getBusInfo`/`getMasterUri`/
//! `shutdown` are still slave-API calls this node serves.

/// The set of XML-RPC methods exchanged between nodes and the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    RegisterService,
    UnregisterService,
    RegisterSubscriber,
    UnregisterSubscriber,
    RegisterPublisher,
    UnregisterPublisher,
    LookupNode,
    GetPublishedTopics,
    GetTopicTypes,
    GetSystemState,
    GetUri,
    LookupService,
    GetParam,
    SetParam,
    HasParam,
    DeleteParam,
    SearchParam,
    SubscribeParam,
    UnsubscribeParam,
    GetParamNames,
    GetBusStats,
    GetBusInfo,
    GetMasterUri,
    Shutdown,
    GetPid,
    GetSubscriptions,
    GetPublications,
    ParamUpdate,
    PublisherUpdate,
    RequestTopic,
}

impl ApiMethod {
    /// The literal XML-RPC method name sent/received on the wire.
    pub const fn name(self) -> &'static str {
        use ApiMethod::*;
        match self {
            RegisterService => "registerService",
            UnregisterService => "unregisterService",
            RegisterSubscriber => "registerSubscriber",
            UnregisterSubscriber => "unregisterSubscriber",
            RegisterPublisher => "registerPublisher",
            UnregisterPublisher => "unregisterPublisher",
            LookupNode => "lookupNode",
            GetPublishedTopics => "getPublishedTopics",
            GetTopicTypes => "getTopicTypes",
            GetSystemState => "getSystemState",
            GetUri => "getUri",
            LookupService => "lookupService",
            GetParam => "getParam",
            SetParam => "setParam",
            HasParam => "hasParam",
            DeleteParam => "deleteParam",
            SearchParam => "searchParam",
            SubscribeParam => "subscribeParam",
            UnsubscribeParam => "unsubscribeParam",
            GetParamNames => "getParamNames",
            GetBusStats => "getBusStats",
            GetBusInfo => "getBusInfo",
            GetMasterUri => "getMasterUri",
            Shutdown => "shutdown",
            GetPid => "getPid",
            GetSubscriptions => "getSubscriptions",
            GetPublications => "getPublications",
            ParamUpdate => "paramUpdate",
            PublisherUpdate => "publisherUpdate",
            RequestTopic => "requestTopic",
        }
    }

    /// Parses an inbound method name, as seen by the slave XML-RPC server.
    pub fn from_name(name: &str) -> Option<Self> {
        use ApiMethod::*;
        Some(match name {
            "registerService" => RegisterService,
            "unregisterService" => UnregisterService,
            "registerSubscriber" => RegisterSubscriber,
            "unregisterSubscriber" => UnregisterSubscriber,
            "registerPublisher" => RegisterPublisher,
            "unregisterPublisher" => UnregisterPublisher,
            "lookupNode" => LookupNode,
            "getPublishedTopics" => GetPublishedTopics,
            "getTopicTypes" => GetTopicTypes,
            "getSystemState" => GetSystemState,
            "getUri" => GetUri,
            "lookupService" => LookupService,
            "getParam" => GetParam,
            "setParam" => SetParam,
            "hasParam" => HasParam,
            "deleteParam" => DeleteParam,
            "searchParam" => SearchParam,
            "subscribeParam" => SubscribeParam,
            "unsubscribeParam" => UnsubscribeParam,
            "getParamNames" => GetParamNames,
            "getBusStats" => GetBusStats,
            "getBusInfo" => GetBusInfo,
            "getMasterUri" => GetMasterUri,
            "shutdown" => Shutdown,
            "getPid" => GetPid,
            "getSubscriptions" => GetSubscriptions,
            "getPublications" => GetPublications,
            "paramUpdate" => ParamUpdate,
            "publisherUpdate" => PublisherUpdate,
            "requestTopic" => RequestTopic,
            _ => return None,
        })
    }

    /// True for methods a node *calls on* the master.
    pub const fn is_master_api(self) -> bool {
        use ApiMethod::*;
        matches!(
            self,
            RegisterService
                | UnregisterService
                | RegisterSubscriber
                | UnregisterSubscriber
                | RegisterPublisher
                | UnregisterPublisher
                | LookupNode
                | GetPublishedTopics
                | GetTopicTypes
                | GetSystemState
                | GetUri
                | LookupService
                | GetParam
                | SetParam
                | HasParam
                | DeleteParam
                | SearchParam
                | SubscribeParam
                | UnsubscribeParam
                | GetParamNames
        )
    }

    /// True for methods a node *serves to* peers and the master.
    pub const fn is_slave_api(self) -> bool {
        !self.is_master_api()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_method_round_trips_through_its_name() {
        let all = [
            ApiMethod::RegisterService,
            ApiMethod::UnregisterService,
            ApiMethod::RegisterSubscriber,
            ApiMethod::UnregisterSubscriber,
            ApiMethod::RegisterPublisher,
            ApiMethod::UnregisterPublisher,
            ApiMethod::LookupNode,
            ApiMethod::GetPublishedTopics,
            ApiMethod::GetTopicTypes,
            ApiMethod::GetSystemState,
            ApiMethod::GetUri,
            ApiMethod::LookupService,
            ApiMethod::GetParam,
            ApiMethod::SetParam,
            ApiMethod::HasParam,
            ApiMethod::DeleteParam,
            ApiMethod::SearchParam,
            ApiMethod::SubscribeParam,
            ApiMethod::UnsubscribeParam,
            ApiMethod::GetParamNames,
            ApiMethod::GetBusStats,
            ApiMethod::GetBusInfo,
            ApiMethod::GetMasterUri,
            ApiMethod::Shutdown,
            ApiMethod::GetPid,
            ApiMethod::GetSubscriptions,
            ApiMethod::GetPublications,
            ApiMethod::ParamUpdate,
            ApiMethod::PublisherUpdate,
            ApiMethod::RequestTopic,
        ];
        for method in all {
            assert_eq!(ApiMethod::from_name(method.name()), Some(method));
        }
    }

    #[test]
    fn master_and_slave_api_partition_the_method_set() {
        assert!(ApiMethod::RegisterPublisher.is_master_api());
        assert!(!ApiMethod::RegisterPublisher.is_slave_api());
        assert!(ApiMethod::RequestTopic.is_slave_api());
        assert!(!ApiMethod::RequestTopic.is_master_api());
    }
}
