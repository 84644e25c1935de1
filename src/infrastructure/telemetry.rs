//! 構造化ログの初期化。
//! tracing クレートを使用し、JSON 形式の構造化ログを出力する。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// init_logger は tracing-subscriber を JSON フォーマットで初期化する。
/// RUST_LOG が設定されていればそれを優先し、無ければ環境に応じた
/// デフォルトレベルを使用する。
///
/// - dev: debug
/// - staging: info
/// - prod: warn
pub fn init_logger(environment: &str) {
    let default_level = match environment {
        "dev" => "debug",
        "staging" => "info",
        _ => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();
}
