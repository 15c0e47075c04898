//! Protocol types compiled from `proto/provider.proto`.

tonic::include_proto!("azureml.provider.v1");
