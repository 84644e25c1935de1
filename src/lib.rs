//! ユーザー単位・エンタイトルメント対応のマルチピリオドレートリミッター。
//!
//! 時間・日・サブスクリプション月の 3 ピリオドの永続カウンターを PostgreSQL に
//! 持ち、サブスクリプションプロバイダから解決したティアの上限と照合して
//! リクエストの許可判定を行う。REST API と組み込み用の axum ミドルウェアの
//! 両方を提供する。

pub mod adapter;
pub mod domain;
pub mod infrastructure;
pub mod usecase;
