//! Scripted in-memory fetcher

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use piradio_ap::http::{Fetcher, Resource};
use piradio_ap::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Reply {
    Body { media_type: String, body: Bytes },
    /// Chunked body; `Err` items are transport errors mid-body
    Stream {
        media_type: String,
        chunks: Vec<std::result::Result<Bytes, String>>,
        hold_open: bool,
    },
    Fail(String),
}

/// Serves queued replies per URL
///
/// Each request pops the next reply for its URL; the last reply is sticky
/// and repeats for every later request. Unknown URLs fail with a fetch
/// error.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, url: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn reply(&self, url: &str, media_type: &str, body: &str) -> &Self {
        self.push(
            url,
            Reply::Body {
                media_type: media_type.to_string(),
                body: Bytes::copy_from_slice(body.as_bytes()),
            },
        )
    }

    /// Serve `chunks` one by one, then end the body
    pub fn reply_chunks(
        &self,
        url: &str,
        media_type: &str,
        chunks: Vec<std::result::Result<Bytes, String>>,
    ) -> &Self {
        self.push(
            url,
            Reply::Stream {
                media_type: media_type.to_string(),
                chunks,
                hold_open: false,
            },
        )
    }

    /// Serve `chunks`, then keep the body open without sending more
    pub fn reply_endless(&self, url: &str, media_type: &str, chunks: Vec<Bytes>) -> &Self {
        self.push(
            url,
            Reply::Stream {
                media_type: media_type.to_string(),
                chunks: chunks.into_iter().map(Ok).collect(),
                hold_open: true,
            },
        )
    }

    pub fn fail(&self, url: &str, reason: &str) -> &Self {
        self.push(url, Reply::Fail(reason.to_string()))
    }

    /// Cancel `token` when the `count`-th request arrives (that request is
    /// still answered)
    pub fn cancel_after(&self, count: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((count, token));
    }

    /// Every requested URL, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Fetcher for ScriptedFetcher {
    async fn open(&self, url: &str) -> Result<Resource> {
        let count = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(url.to_string());
            requests.len()
        };
        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *limit {
                token.cancel();
            }
        }

        match self.next_reply(url) {
            Some(Reply::Body { media_type, body }) => Ok(Resource::from_bytes(url, media_type, body)),
            Some(Reply::Stream {
                media_type,
                chunks,
                hold_open,
            }) => {
                let source = url.to_string();
                let items = stream::iter(chunks).map(move |chunk| {
                    chunk.map_err(|reason| Error::fetch(source.as_str(), reason))
                });
                let body = if hold_open {
                    items.chain(stream::pending()).boxed()
                } else {
                    items.boxed()
                };
                Ok(Resource {
                    url: url.to_string(),
                    media_type,
                    body,
                })
            }
            Some(Reply::Fail(reason)) => Err(Error::fetch(url, reason)),
            None => Err(Error::fetch(url, "HTTP 404 Not Found")),
        }
    }
}
