pub mod deadline_classifier;
pub mod onnx_emotion_classifier;
