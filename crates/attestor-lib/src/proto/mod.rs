//! Protobuf bindings
//!
//! Hand-maintained prost/tonic bindings for the two gRPC surfaces the
//! attestor touches: the subset of the container runtime interface used for
//! pid lookup, and the SPIFFE Workload API served to local workloads.
//! Unknown fields in runtime responses are skipped by prost, so only the
//! fields read here are declared.

pub mod runtime {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerFilter {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "3")]
            pub pod_sandbox_id: String,
            #[prost(map = "string, string", tag = "4")]
            pub label_selector: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListContainersRequest {
            #[prost(message, optional, tag = "1")]
            pub filter: Option<ContainerFilter>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerMetadata {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(uint32, tag = "2")]
            pub attempt: u32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ImageSpec {
            #[prost(string, tag = "1")]
            pub image: String,
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ContainerState {
            ContainerCreated = 0,
            ContainerRunning = 1,
            ContainerExited = 2,
            ContainerUnknown = 3,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct Container {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(string, tag = "2")]
            pub pod_sandbox_id: String,
            #[prost(message, optional, tag = "3")]
            pub metadata: Option<ContainerMetadata>,
            #[prost(message, optional, tag = "4")]
            pub image: Option<ImageSpec>,
            #[prost(string, tag = "5")]
            pub image_ref: String,
            #[prost(enumeration = "ContainerState", tag = "6")]
            pub state: i32,
            #[prost(int64, tag = "7")]
            pub created_at: i64,
            #[prost(map = "string, string", tag = "8")]
            pub labels: HashMap<String, String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ListContainersResponse {
            #[prost(message, repeated, tag = "1")]
            pub containers: Vec<Container>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStatusRequest {
            #[prost(string, tag = "1")]
            pub container_id: String,
            #[prost(bool, tag = "2")]
            pub verbose: bool,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStatus {
            #[prost(string, tag = "1")]
            pub id: String,
            #[prost(message, optional, tag = "2")]
            pub metadata: Option<ContainerMetadata>,
            #[prost(enumeration = "ContainerState", tag = "3")]
            pub state: i32,
            #[prost(int64, tag = "4")]
            pub created_at: i64,
            #[prost(int64, tag = "5")]
            pub started_at: i64,
            #[prost(message, optional, tag = "8")]
            pub image: Option<ImageSpec>,
            #[prost(string, tag = "9")]
            pub image_ref: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerStatusResponse {
            #[prost(message, optional, tag = "1")]
            pub status: Option<ContainerStatus>,
            /// Runtime-specific verbose information, only set when requested
            #[prost(map = "string, string", tag = "2")]
            pub info: HashMap<String, String>,
        }

        pub mod runtime_service_client {
            use super::*;
            use tonic::codegen::*;

            #[derive(Debug, Clone)]
            pub struct RuntimeServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl RuntimeServiceClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> RuntimeServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub async fn list_containers(
                    &mut self,
                    request: impl tonic::IntoRequest<ListContainersRequest>,
                ) -> Result<tonic::Response<ListContainersResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/ListContainers",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn container_status(
                    &mut self,
                    request: impl tonic::IntoRequest<ContainerStatusRequest>,
                ) -> Result<tonic::Response<ContainerStatusResponse>, tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/runtime.v1.RuntimeService/ContainerStatus",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub mod workload {
    use prost::Message;

    /// Request metadata key every Workload API call must carry
    pub const SECURITY_HEADER: &str = "workload.spiffe.io";

    #[derive(Clone, PartialEq, Message)]
    pub struct X509svidRequest {}

    #[derive(Clone, PartialEq, Message)]
    pub struct X509svid {
        #[prost(string, tag = "1")]
        pub spiffe_id: String,
        #[prost(bytes = "vec", tag = "2")]
        pub x509_svid: Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub x509_svid_key: Vec<u8>,
        #[prost(bytes = "vec", tag = "4")]
        pub bundle: Vec<u8>,
        #[prost(string, tag = "5")]
        pub hint: String,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct X509svidResponse {
        #[prost(message, repeated, tag = "1")]
        pub svids: Vec<X509svid>,
        #[prost(bytes = "vec", repeated, tag = "2")]
        pub crl: Vec<Vec<u8>>,
    }

    pub mod spiffe_workload_api_client {
        use super::*;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct SpiffeWorkloadApiClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl SpiffeWorkloadApiClient<tonic::transport::Channel> {
            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> SpiffeWorkloadApiClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub async fn fetch_x509svid(
                &mut self,
                request: impl tonic::IntoRequest<X509svidRequest>,
            ) -> Result<tonic::Response<tonic::codec::Streaming<X509svidResponse>>, tonic::Status>
            {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path =
                    http::uri::PathAndQuery::from_static("/SpiffeWorkloadAPI/FetchX509SVID");
                self.inner
                    .server_streaming(request.into_request(), path, codec)
                    .await
            }
        }
    }

    pub mod spiffe_workload_api_server {
        use super::*;
        use tonic::codegen::*;

        #[async_trait]
        pub trait SpiffeWorkloadApi: Send + Sync + 'static {
            type FetchX509SVIDStream: ::tokio_stream::Stream<Item = Result<X509svidResponse, tonic::Status>>
                + Send
                + 'static;

            async fn fetch_x509svid(
                &self,
                request: tonic::Request<X509svidRequest>,
            ) -> Result<tonic::Response<Self::FetchX509SVIDStream>, tonic::Status>;
        }

        #[derive(Debug)]
        pub struct SpiffeWorkloadApiServer<T: SpiffeWorkloadApi> {
            inner: Arc<T>,
        }

        impl<T: SpiffeWorkloadApi> SpiffeWorkloadApiServer<T> {
            pub fn new(inner: T) -> Self {
                Self::from_arc(Arc::new(inner))
            }

            pub fn from_arc(inner: Arc<T>) -> Self {
                Self { inner }
            }
        }

        impl<T: SpiffeWorkloadApi> Clone for SpiffeWorkloadApiServer<T> {
            fn clone(&self) -> Self {
                Self {
                    inner: Arc::clone(&self.inner),
                }
            }
        }

        struct FetchX509SvidSvc<T: SpiffeWorkloadApi>(Arc<T>);

        impl<T: SpiffeWorkloadApi> tonic::server::ServerStreamingService<X509svidRequest>
            for FetchX509SvidSvc<T>
        {
            type Response = X509svidResponse;
            type ResponseStream = T::FetchX509SVIDStream;
            type Future = BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;

            fn call(&mut self, request: tonic::Request<X509svidRequest>) -> Self::Future {
                let inner = Arc::clone(&self.0);
                Box::pin(async move { inner.fetch_x509svid(request).await })
            }
        }

        impl<T, B> Service<http::Request<B>> for SpiffeWorkloadApiServer<T>
        where
            T: SpiffeWorkloadApi,
            B: Body + Send + 'static,
            B::Error: Into<StdError> + Send + 'static,
        {
            type Response = http::Response<tonic::body::BoxBody>;
            type Error = std::convert::Infallible;
            type Future = BoxFuture<Self::Response, Self::Error>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: http::Request<B>) -> Self::Future {
                match req.uri().path() {
                    "/SpiffeWorkloadAPI/FetchX509SVID" => {
                        let inner = Arc::clone(&self.inner);
                        Box::pin(async move {
                            let method = FetchX509SvidSvc(inner);
                            let codec = tonic::codec::ProstCodec::default();
                            let mut grpc = tonic::server::Grpc::new(codec);
                            Ok(grpc.server_streaming(method, req).await)
                        })
                    }
                    _ => Box::pin(async move {
                        let mut response = http::Response::new(empty_body());
                        let headers = response.headers_mut();
                        headers.insert("grpc-status", http::HeaderValue::from_static("12"));
                        headers.insert(
                            http::header::CONTENT_TYPE,
                            http::HeaderValue::from_static("application/grpc"),
                        );
                        Ok(response)
                    }),
                }
            }
        }

        impl<T: SpiffeWorkloadApi> tonic::server::NamedService for SpiffeWorkloadApiServer<T> {
            const NAME: &'static str = "SpiffeWorkloadAPI";
        }
    }

    pub use spiffe_workload_api_client::SpiffeWorkloadApiClient;
    pub use spiffe_workload_api_server::{SpiffeWorkloadApi, SpiffeWorkloadApiServer};
}

pub use runtime::v1::runtime_service_client::RuntimeServiceClient;
