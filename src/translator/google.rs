//! Google 翻译（gtx 免密钥接口）

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::{equivalent_language_codes, restricted_message, Translator, PROXY_HINT};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Error, Debug)]
enum GtxError {
    #[error("HTTP请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务端返回 {0}")]
    Status(u16),
    #[error("响应格式异常: {0}")]
    Malformed(String),
}

impl GtxError {
    /// 网络层失败（连接失败、超时）
    fn is_network(&self) -> bool {
        match self {
            GtxError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// 基于 reqwest 的 gtx 客户端
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: Url,
}

impl GoogleTranslator {
    pub fn new(endpoint: &str, timeout: Duration) -> EngineResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| EngineError::ConfigError(format!("无效的翻译接口地址 {}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ProviderError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        Self::new(&config.provider_endpoint, config.provider_timeout())
    }

    /// 组装请求地址
    pub fn request_url(&self, text: &str, target_lang: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client", "gtx")
            .append_pair("sl", "auto")
            .append_pair("tl", target_lang)
            .append_pair("dt", "t")
            .append_pair("dt", "ld")
            .append_pair("q", text);
        url
    }

    async fn request(&self, text: &str, target_lang: &str) -> Result<String, GtxError> {
        let url = self.request_url(text, target_lang);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GtxError::Status(status.as_u16()));
        }

        let data: Value = resp.json().await?;
        parse_response(&data, text, target_lang)
    }
}

/// 解析 gtx 响应
///
/// `data[2]` 为检测到的源语言，与目标语言等同时原样返回原文；
/// 否则用空格拼接 `data[0][i][0]` 的各段译文。
fn parse_response(data: &Value, text: &str, target_lang: &str) -> Result<String, GtxError> {
    if let Some(detected) = data.get(2).and_then(Value::as_str) {
        if equivalent_language_codes(target_lang).contains(&detected) {
            debug!("提供方检测到源语言 {} 即目标语言，跳过翻译", detected);
            return Ok(text.to_string());
        }
    }

    let segments = data
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| GtxError::Malformed("缺少译文段落".to_string()))?;

    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

#[async_trait(?Send)]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        match self.request(text, target_lang).await {
            Ok(translated) => translated,
            Err(e) if e.is_network() => {
                warn!("翻译请求网络失败: {}", e);
                PROXY_HINT.to_string()
            }
            Err(e) => {
                warn!("翻译请求失败: {}", e);
                restricted_message(target_lang).to_string()
            }
        }
    }
}
