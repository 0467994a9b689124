//! `spadesk-promotions`: coupons and gift cards.
//!
//! Coupons cover three flavours: standard codes anyone can use, promotion
//! codes issued to one customer for an occasion, and rewards codes bought
//! with loyalty points. Gift cards are stored-value tenders.

pub mod coupon;
pub mod gift_card;
pub mod rule;

pub use coupon::{
    Coupon, CouponCommand, CouponEvent, CouponId, CouponKind, CouponPatch, CouponTerms,
    Occasion, Redemption, normalize_code,
};
pub use gift_card::{GiftCard, GiftCardCommand, GiftCardEvent, GiftCardId, GiftCardRedemption};
pub use rule::{CouponScope, DiscountRule};
