use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dialog-server",
    about = "Conversational orchestration between STT and the LLM gateway",
    version
)]
pub struct Args {
    /// gRPC listen port (overrides DIALOG_SERVICE_GRPC_PORT)
    #[arg(long)]
    pub grpc_port: Option<u16>,

    /// Health HTTP port (overrides DIALOG_SERVICE_HTTP_PORT)
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Emit JSON logs even in development
    #[arg(long)]
    pub json_logs: bool,
}
