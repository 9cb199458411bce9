//! Request-scoped masking controller.
//!
//! The capture layer attaches a [`Controller`] to every request's
//! extensions. Handler code retrieves it (via [`Controller::from_extensions`]
//! or a framework extractor) and registers masks, a path-hint override, or a
//! customer id for that one exchange. The instant the handler returns the
//! registry is frozen; the background build task reads it exactly once.
//!
//! # Example
//!
//! ```ignore
//! use apitap_core::Controller;
//!
//! fn handler(req: http::Request<axum::body::Body>) {
//!     if let Some(ctl) = Controller::from_extensions(req.extensions()) {
//!         ctl.mask_request_headers(["authorization"], &[]);
//!         ctl.mask_response_string_fields(["ssn", "email"], &["***"]);
//!         ctl.set_customer_id("customer-42");
//!     }
//! }
//! ```

use crate::mask::{assign_masks, MaskSet, DEFAULT_NUMBER_MASK, DEFAULT_STRING_MASK};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cheap-to-clone handle to one exchange's mask registry.
///
/// Every registrar takes an ordered list of target keys plus zero or more
/// replacements: no replacement uses the category default
/// ([`DEFAULT_STRING_MASK`] for text, [`DEFAULT_NUMBER_MASK`] for numeric
/// fields), a single replacement applies to every key, and multiple
/// replacements pair positionally with keys left over falling back to the
/// default.
///
/// All mutation must happen before the handler returns; registrations made
/// after that are lost.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    inner: Arc<Mutex<MaskSet>>,
}

impl Controller {
    /// Retrieve the controller attached to a request by the capture layer.
    ///
    /// Returns `None` when the request did not pass through the layer.
    pub fn from_extensions(extensions: &http::Extensions) -> Option<Controller> {
        extensions.get::<Controller>().cloned()
    }

    /// Mask the named query-string parameters.
    pub fn mask_query_strings(
        &self,
        keys: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = keys.into_iter().map(Into::into).collect();
        assign_masks(&mut self.lock().query_string_masks, keys, masks, DEFAULT_STRING_MASK);
    }

    /// Mask the named request headers. Names are matched case-insensitively.
    pub fn mask_request_headers(
        &self,
        headers: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = lowercase(headers);
        assign_masks(&mut self.lock().request_header_masks, keys, masks, DEFAULT_STRING_MASK);
    }

    /// Mask the named response headers. Names are matched case-insensitively.
    pub fn mask_response_headers(
        &self,
        headers: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = lowercase(headers);
        assign_masks(&mut self.lock().response_header_masks, keys, masks, DEFAULT_STRING_MASK);
    }

    /// Mask the named request cookies.
    pub fn mask_request_cookies(
        &self,
        cookies: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = cookies.into_iter().map(Into::into).collect();
        assign_masks(&mut self.lock().request_cookie_masks, keys, masks, DEFAULT_STRING_MASK);
    }

    /// Mask the named response cookies.
    pub fn mask_response_cookies(
        &self,
        cookies: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = cookies.into_iter().map(Into::into).collect();
        assign_masks(&mut self.lock().response_cookie_masks, keys, masks, DEFAULT_STRING_MASK);
    }

    /// Mask the named string fields in the request body. Matches at any
    /// nesting depth.
    pub fn mask_request_string_fields(
        &self,
        fields: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = fields.into_iter().map(Into::into).collect();
        assign_masks(
            &mut self.lock().request_field_masks_string,
            keys,
            masks,
            DEFAULT_STRING_MASK,
        );
    }

    /// Mask the named number fields in the request body. Matches at any
    /// nesting depth.
    pub fn mask_request_number_fields(
        &self,
        fields: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = fields.into_iter().map(Into::into).collect();
        assign_masks(
            &mut self.lock().request_field_masks_number,
            keys,
            masks,
            DEFAULT_NUMBER_MASK,
        );
    }

    /// Mask the named string fields in the response body. Matches at any
    /// nesting depth.
    pub fn mask_response_string_fields(
        &self,
        fields: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = fields.into_iter().map(Into::into).collect();
        assign_masks(
            &mut self.lock().response_field_masks_string,
            keys,
            masks,
            DEFAULT_STRING_MASK,
        );
    }

    /// Mask the named number fields in the response body. Matches at any
    /// nesting depth.
    pub fn mask_response_number_fields(
        &self,
        fields: impl IntoIterator<Item = impl Into<String>>,
        masks: &[&str],
    ) {
        let keys = fields.into_iter().map(Into::into).collect();
        assign_masks(
            &mut self.lock().response_field_masks_number,
            keys,
            masks,
            DEFAULT_NUMBER_MASK,
        );
    }

    /// Override the path hint for this exchange.
    ///
    /// The override replaces any framework-extracted template verbatim; it
    /// is not normalized. Last write wins.
    pub fn set_path_hint(&self, path_hint: impl Into<String>) {
        self.lock().path_hint = Some(path_hint.into());
    }

    /// Associate a customer id with this exchange. Last write wins.
    pub fn set_customer_id(&self, customer_id: impl Into<String>) {
        self.lock().customer_id = Some(customer_id.into());
    }

    /// Take the registry out of the handle. Called once at handler return;
    /// later registrations land in an empty set nobody reads.
    pub(crate) fn freeze(&self) -> MaskSet {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, MaskSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lowercase(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    names.into_iter().map(|n| n.into().to_lowercase()).collect()
}
