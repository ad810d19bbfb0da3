// Return-label workflow (reverse logistics)
pub mod return_labels;

// Carrier reconciliation engine
pub mod shipment_sync;
