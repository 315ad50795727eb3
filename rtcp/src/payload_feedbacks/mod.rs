pub mod application_layer_feedback;
pub mod full_intra_request;
pub mod picture_loss_indication;
pub mod reference_picture_selection_indication;
pub mod slice_loss_indication;
