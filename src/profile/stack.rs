// src/profile/stack.rs

//! Scoped profile activation
//!
//! Activating a profile pushes it onto a stack owned by the build context;
//! the returned guard pops it when dropped. Early returns, `?` propagation
//! and unwinding all restore the previous profile.

use super::Profile;
use std::ops::{Deref, DerefMut};

/// Stack of active profiles with a permanent base entry
#[derive(Debug, Clone)]
pub struct ProfileStack {
    base: Profile,
    active: Vec<Profile>,
}

impl ProfileStack {
    pub fn new(base: Profile) -> Self {
        Self {
            base,
            active: Vec::new(),
        }
    }

    /// Innermost active profile, or the base profile
    pub fn current(&self) -> &Profile {
        self.active.last().unwrap_or(&self.base)
    }

    /// Number of activations above the base
    pub fn depth(&self) -> usize {
        self.active.len()
    }

    fn push(&mut self, profile: Profile) {
        self.active.push(profile);
    }

    fn pop(&mut self) {
        debug_assert!(!self.active.is_empty(), "profile stack underflow");
        self.active.pop();
    }

    /// Activate `profile` until the returned guard is dropped
    pub fn activate(&mut self, profile: Profile) -> ActiveProfile<'_, Self> {
        ActiveProfile::new(self, profile)
    }
}

/// Anything that owns a [`ProfileStack`]
pub trait HasProfileStack {
    fn profile_stack(&mut self) -> &mut ProfileStack;
}

impl HasProfileStack for ProfileStack {
    fn profile_stack(&mut self) -> &mut ProfileStack {
        self
    }
}

/// Guard for an activated profile
///
/// Dereferences to the owner, so work done through the guard sees the
/// activated profile as current.
pub struct ActiveProfile<'g, T: HasProfileStack + ?Sized> {
    owner: &'g mut T,
}

impl<'g, T: HasProfileStack + ?Sized> ActiveProfile<'g, T> {
    pub fn new(owner: &'g mut T, profile: Profile) -> Self {
        owner.profile_stack().push(profile);
        Self { owner }
    }
}

impl<T: HasProfileStack + ?Sized> Deref for ActiveProfile<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: HasProfileStack + ?Sized> DerefMut for ActiveProfile<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.owner
    }
}

impl<T: HasProfileStack + ?Sized> Drop for ActiveProfile<'_, T> {
    fn drop(&mut self) {
        self.owner.profile_stack().pop();
    }
}
