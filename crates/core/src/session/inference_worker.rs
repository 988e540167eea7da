use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{FaceDetector, InferenceError};
use crate::shared::frame::Frame;

struct InferenceRequest {
    seq: u64,
    frame: Frame,
}

pub struct InferenceReply {
    pub seq: u64,
    pub result: Result<Vec<Detection>, InferenceError>,
}

/// Runs a [`FaceDetector`] on its own thread.
///
/// Requests are numbered so a caller that gave up waiting can recognise the
/// late reply. Both channels hold a single message: callers keep at most
/// one request in flight.
///
/// The thread is detached. It exits once this handle is dropped and any
/// running `detect` call has returned.
pub struct InferenceWorker {
    requests: Sender<InferenceRequest>,
    replies: Receiver<InferenceReply>,
    next_seq: u64,
}

impl InferenceWorker {
    pub fn spawn(detector: Box<dyn FaceDetector>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<InferenceRequest>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<InferenceReply>(1);

        std::thread::Builder::new()
            .name("liveliness-inference".into())
            .spawn(move || run_worker(detector, request_rx, reply_tx))?;

        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            next_seq: 0,
        })
    }

    /// Hands a frame to the detector and returns the request's sequence number.
    pub fn submit(&mut self, frame: Frame) -> Result<u64, InferenceError> {
        let seq = self.next_seq;
        match self.requests.try_send(InferenceRequest { seq, frame }) {
            Ok(()) => {
                self.next_seq += 1;
                Ok(seq)
            }
            Err(TrySendError::Full(_)) => Err(InferenceError::Failed(
                "a previous request is still queued".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(InferenceError::WorkerGone),
        }
    }

    pub fn replies(&self) -> &Receiver<InferenceReply> {
        &self.replies
    }
}

fn run_worker(
    mut detector: Box<dyn FaceDetector>,
    requests: Receiver<InferenceRequest>,
    replies: Sender<InferenceReply>,
) {
    for request in requests {
        let result = detector.detect(&request.frame);
        let reply = InferenceReply {
            seq: request.seq,
            result,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    log::debug!("Inference worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::LandmarkSchemaError;
    use crate::shared::geometry::{BoundingBox, Point};
    use std::time::Duration;

    struct EchoDetector;

    impl FaceDetector for EchoDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
            if frame.width() == 0 {
                return Err(LandmarkSchemaError { got: 2 }.into());
            }
            let b = BoundingBox::new(
                Point::new(0.0, 0.0),
                Point::new(frame.width() as f32, frame.height() as f32),
            );
            Ok(vec![Detection::new(b, None, 1.0)])
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_replies_carry_request_sequence() {
        let mut worker = InferenceWorker::spawn(Box::new(EchoDetector)).unwrap();

        let first = worker.submit(Frame::blank(4, 2, 0)).unwrap();
        let reply = worker.replies().recv_timeout(WAIT).unwrap();
        assert_eq!(reply.seq, first);
        let dets = reply.result.unwrap();
        assert_eq!(dets[0].bounding_box.width(), 4.0);

        let second = worker.submit(Frame::blank(8, 2, 1)).unwrap();
        assert_eq!(second, first + 1);
        let reply = worker.replies().recv_timeout(WAIT).unwrap();
        assert_eq!(reply.seq, second);
    }

    #[test]
    fn test_detector_errors_are_forwarded() {
        let mut worker = InferenceWorker::spawn(Box::new(EchoDetector)).unwrap();
        worker.submit(Frame::blank(0, 0, 0)).unwrap();
        let reply = worker.replies().recv_timeout(WAIT).unwrap();
        assert!(matches!(reply.result, Err(InferenceError::Schema(_))));
    }

    struct PanickingDetector;

    impl FaceDetector for PanickingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
            panic!("detector crashed");
        }
    }

    #[test]
    fn test_dead_worker_reports_gone() {
        let mut worker = InferenceWorker::spawn(Box::new(PanickingDetector)).unwrap();
        worker.submit(Frame::blank(1, 1, 0)).unwrap();
        assert!(worker.replies().recv_timeout(WAIT).is_err());
        assert!(matches!(
            worker.submit(Frame::blank(1, 1, 1)),
            Err(InferenceError::WorkerGone)
        ));
    }
}
