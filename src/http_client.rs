use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    pub async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client.post(url).json(body).send().await
    }

    /// POST a single file part and decode the JSON reply.
    pub async fn post_file_json<T: DeserializeOwned>(
        &self,
        url: &str,
        field: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<T, reqwest::Error> {
        let part = Part::bytes(data)
            .file_name("upload")
            .mime_str(content_type)?;
        let form = Form::new().part(field.to_string(), part);
        self.client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
