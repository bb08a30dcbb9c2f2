pub mod label_annotator;
