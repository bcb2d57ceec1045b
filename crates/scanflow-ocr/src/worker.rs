//! Background OCR worker
//!
//! The pipeline is built on the worker thread itself, so the engine and
//! fallback recognizer never cross threads. Requests arrive over a crossbeam
//! channel and are served one at a time; each carries its own reply channel
//! and [`CancelToken`].
//!
//! ```text
//! [caller] --Message::Recognize--> [scanflow-ocr thread] --Result<RecognitionReport>--> [caller]
//! ```

use crate::config::OcrSettings;
use crate::error::{OcrError, Result};
use crate::pipeline::{CancelToken, OcrPipeline, RecognitionReport};
use crate::types::SeparatorLine;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use image::DynamicImage;
use std::thread::{self, JoinHandle};

const WORKER_THREAD_NAME: &str = "scanflow-ocr";

struct RecognizeRequest {
    image: DynamicImage,
    separators: Vec<SeparatorLine>,
    settings: OcrSettings,
    cancel: CancelToken,
    reply: Sender<Result<RecognitionReport>>,
}

enum Message {
    Recognize(Box<RecognizeRequest>),
    Shutdown,
}

/// A submitted request whose result has not been collected yet
#[derive(Debug)]
pub struct PendingRecognition {
    cancel: CancelToken,
    reply: Receiver<Result<RecognitionReport>>,
}

impl PendingRecognition {
    /// Ask the worker to stop this request at its next stage boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Block until the worker answers
    ///
    /// # Errors
    ///
    /// The request's own error, or [`OcrError::WorkerDisconnected`] if the
    /// worker exited without answering.
    pub fn wait(self) -> Result<RecognitionReport> {
        self.reply.recv().map_err(|_| OcrError::WorkerDisconnected)?
    }
}

/// Owns a thread running an [`OcrPipeline`]
#[derive(Debug)]
pub struct OcrWorker {
    requests: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl OcrWorker {
    /// Start the worker thread and build the pipeline on it with `build`
    ///
    /// # Errors
    ///
    /// Returns `build`'s error, or [`OcrError::WorkerDisconnected`] if the
    /// thread could not be started or died before reporting.
    pub fn spawn<F>(build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<OcrPipeline> + Send + 'static,
    {
        let (request_tx, request_rx) = unbounded::<Message>();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let pipeline = match build() {
                    Ok(pipeline) => {
                        let _ = ready_tx.send(Ok(()));
                        pipeline
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                serve(pipeline, &request_rx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::debug!("OCR worker started");
                Ok(Self {
                    requests: request_tx,
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(OcrError::WorkerDisconnected)
            }
        }
    }

    /// Queue one image for recognition
    ///
    /// # Errors
    ///
    /// [`OcrError::WorkerDisconnected`] if the worker has exited.
    pub fn submit(
        &self,
        image: DynamicImage,
        separators: Vec<SeparatorLine>,
        settings: OcrSettings,
    ) -> Result<PendingRecognition> {
        self.submit_with_cancel(image, separators, settings, CancelToken::new())
    }

    /// Queue one image, stopping early once `cancel` fires
    ///
    /// A request cancelled while still queued is answered with
    /// [`OcrError::Cancelled`] without touching the engine.
    ///
    /// # Errors
    ///
    /// [`OcrError::WorkerDisconnected`] if the worker has exited.
    pub fn submit_with_cancel(
        &self,
        image: DynamicImage,
        separators: Vec<SeparatorLine>,
        settings: OcrSettings,
        cancel: CancelToken,
    ) -> Result<PendingRecognition> {
        let (reply_tx, reply_rx) = bounded(1);
        let request = RecognizeRequest {
            image,
            separators,
            settings,
            cancel: cancel.clone(),
            reply: reply_tx,
        };
        self.requests
            .send(Message::Recognize(Box::new(request)))
            .map_err(|_| OcrError::WorkerDisconnected)?;
        Ok(PendingRecognition {
            cancel,
            reply: reply_rx,
        })
    }

    /// Submit and wait
    ///
    /// # Errors
    ///
    /// See [`OcrWorker::submit`] and [`PendingRecognition::wait`].
    pub fn recognize(
        &self,
        image: DynamicImage,
        separators: Vec<SeparatorLine>,
        settings: OcrSettings,
    ) -> Result<RecognitionReport> {
        self.submit(image, separators, settings)?.wait()
    }

    /// Stop after queued requests drain and join the thread
    ///
    /// # Errors
    ///
    /// [`OcrError::WorkerDisconnected`] if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let _ = self.requests.send(Message::Shutdown);
        handle.join().map_err(|_| {
            log::error!("OCR worker thread panicked");
            OcrError::WorkerDisconnected
        })
    }
}

impl Drop for OcrWorker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn serve(mut pipeline: OcrPipeline, requests: &Receiver<Message>) {
    for message in requests {
        match message {
            Message::Recognize(request) => {
                let RecognizeRequest {
                    image,
                    separators,
                    settings,
                    cancel,
                    reply,
                } = *request;
                let result = cancel
                    .check("queue")
                    .and_then(|()| pipeline.recognize(&image, &separators, &settings, &cancel));
                if let Err(e) = &result {
                    log::debug!("OCR request failed: {e}");
                }
                // Caller may have dropped its receiver
                let _ = reply.send(result);
            }
            Message::Shutdown => break,
        }
    }
    pipeline.supervisor_mut().terminate();
    log::debug!("OCR worker stopped");
}
