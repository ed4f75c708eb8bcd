/// Projects are managed by the excluded metadata layer, so all the pipeline
/// ever sees is the id.
pub type ProjectId = i32;
