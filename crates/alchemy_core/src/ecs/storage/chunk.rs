// chunk.rs - Fixed-budget byte-packed SoA block
//
// One heap allocation per chunk. Each component of the archetype owns a
// column inside it: `offsets[slot] + index * sizes[slot]`. Occupancy is
// dense; rows [0, len) are live.

use crate::ecs::{Component, ComponentType};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};

/// Default byte budget for a single chunk.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Zero-initialised aligned allocation backing a chunk.
struct ChunkBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The buffer is plain bytes owned exclusively by its chunk.
unsafe impl Send for ChunkBuffer {}

impl ChunkBuffer {
    fn zeroed(layout: Layout) -> Self {
        if layout.size() == 0 {
            // Aligned, non-null and never dereferenced for more than 0 bytes.
            let ptr = NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling());
            return Self { ptr, layout };
        }

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Self { ptr, layout }
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialised bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for ChunkBuffer {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}

/// Fixed-capacity block holding one archetype's components for up to
/// `capacity` entities.
///
/// The byte buffer sits behind a mutex so component values can be read or
/// overwritten through `&Chunk` (the world's shared-lock path). Anything
/// holding `&mut Chunk` goes straight to the bytes.
pub struct Chunk {
    buffer: Mutex<ChunkBuffer>,
    offsets: Box<[usize]>,
    sizes: Box<[usize]>,
    capacity: usize,
    entities: Vec<u32>,
}

impl Chunk {
    /// Lay out a chunk for `types` (in slot order) within `chunk_bytes`.
    ///
    /// Capacity is `max(1, chunk_bytes / stride)` where stride is the sum of
    /// component sizes. A schema with no bytes per entity (the empty
    /// archetype, tags only) gets `chunk_bytes` rows.
    pub fn new(types: &[ComponentType], chunk_bytes: usize) -> Self {
        let stride: usize = types.iter().map(|ty| ty.size).sum();
        let capacity = match stride {
            0 => chunk_bytes.max(1),
            stride => (chunk_bytes / stride).max(1),
        };

        let mut offsets = Vec::with_capacity(types.len());
        let mut sizes = Vec::with_capacity(types.len());
        let mut offset = 0usize;
        let mut align = 1usize;
        for ty in types {
            offset = align_up(offset, ty.align);
            offsets.push(offset);
            sizes.push(ty.size);
            offset += ty.size * capacity;
            align = align.max(ty.align);
        }

        let layout = Layout::from_size_align(offset, align).expect("chunk layout overflow");

        Self {
            buffer: Mutex::new(ChunkBuffer::zeroed(layout)),
            offsets: offsets.into_boxed_slice(),
            sizes: sizes.into_boxed_slice(),
            capacity,
            entities: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.capacity
    }

    /// Entity ids in row order.
    #[inline]
    pub fn entities(&self) -> &[u32] {
        &self.entities
    }

    #[inline]
    pub fn entity_at(&self, index: usize) -> u32 {
        self.entities[index]
    }

    /// Record which entity occupies `index`.
    pub fn set_entity(&mut self, index: usize, entity_id: u32) {
        self.entities[index] = entity_id;
    }

    /// Append a row for `entity_id` with all component bytes zeroed.
    ///
    /// Panics if the chunk is full.
    pub fn push(&mut self, entity_id: u32) -> usize {
        assert!(!self.is_full(), "chunk is full ({} rows)", self.capacity);
        let index = self.entities.len();
        let bytes = self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner).bytes_mut();
        for (&offset, &size) in self.offsets.iter().zip(self.sizes.iter()) {
            let start = offset + index * size;
            bytes[start..start + size].fill(0);
        }
        self.entities.push(entity_id);
        index
    }

    /// Remove the row at `index`, moving the last row into its place.
    ///
    /// Returns the id of the entity that moved, if any.
    pub fn swap_remove(&mut self, index: usize) -> Option<u32> {
        let last = self.entities.len() - 1;
        if index != last {
            let bytes = self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner).bytes_mut();
            for (&offset, &size) in self.offsets.iter().zip(self.sizes.iter()) {
                let from = offset + last * size;
                bytes.copy_within(from..from + size, offset + index * size);
            }
        }
        self.entities.swap_remove(index);
        (index != last).then(|| self.entities[index])
    }

    /// Copy one component value from this chunk into `dest`.
    pub fn copy_component_to(
        &mut self,
        slot: usize,
        index: usize,
        dest: &mut Chunk,
        dest_slot: usize,
        dest_index: usize,
    ) {
        let size = self.sizes[slot];
        debug_assert_eq!(size, dest.sizes[dest_slot], "component size differs between chunks");
        let start = self.offsets[slot] + index * size;
        let src = &self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner).bytes()[start..start + size];
        let dest_start = dest.offsets[dest_slot] + dest_index * size;
        dest.buffer.get_mut().unwrap_or_else(PoisonError::into_inner).bytes_mut()
            [dest_start..dest_start + size]
            .copy_from_slice(src);
    }

    /// Read a component value by copy.
    pub fn read_component<T: Component>(&self, slot: usize, index: usize) -> T {
        let size = self.sizes[slot];
        let start = self.offsets[slot] + index * size;
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        bytemuck::pod_read_unaligned(&buffer.bytes()[start..start + size])
    }

    /// Overwrite a component value from raw bytes.
    ///
    /// Panics if `bytes` is not exactly the component's size.
    pub fn write_component_bytes(&self, slot: usize, index: usize, bytes: &[u8]) {
        let size = self.sizes[slot];
        assert_eq!(bytes.len(), size, "component byte length mismatch");
        let start = self.offsets[slot] + index * size;
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.bytes_mut()[start..start + size].copy_from_slice(bytes);
    }

    pub fn write_component<T: Component>(&self, slot: usize, index: usize, value: &T) {
        self.write_component_bytes(slot, index, bytemuck::bytes_of(value));
    }

    /// Mutable reference to a single component value.
    pub fn component_mut<T: Component>(&mut self, slot: usize, index: usize) -> &mut T {
        &mut self.column_mut::<T>(slot)[index]
    }

    /// Live rows of one column as a typed slice.
    pub fn column_mut<T: Component>(&mut self, slot: usize) -> &mut [T] {
        let len = self.len();
        let [bytes] = self.columns_mut([slot]);
        cast_column_mut::<T>(bytes, len)
    }

    /// Disjoint mutable byte views of the live rows of several columns.
    ///
    /// Panics if the same non-empty column is requested twice.
    pub fn columns_mut<const N: usize>(&mut self, slots: [usize; N]) -> [&mut [u8]; N] {
        let len = self.entities.len();
        let offsets = &self.offsets;
        let sizes = &self.sizes;

        let mut order: [usize; N] = std::array::from_fn(|i| i);
        order.sort_unstable_by_key(|&i| offsets[slots[i]]);

        let mut out: [Option<&mut [u8]>; N] = std::array::from_fn(|_| None);
        let mut rest = self.buffer.get_mut().unwrap_or_else(PoisonError::into_inner).bytes_mut();
        let mut consumed = 0usize;
        for &i in &order {
            let slot = slots[i];
            if sizes[slot] == 0 {
                // Zero-sized columns share their offset with the next column.
                out[i] = Some(Default::default());
                continue;
            }
            let start = offsets[slot];
            let width = sizes[slot] * len;
            assert!(start >= consumed, "column {slot} borrowed twice");

            let (_, tail) = std::mem::take(&mut rest).split_at_mut(start - consumed);
            let (column, tail) = tail.split_at_mut(width);
            out[i] = Some(column);
            rest = tail;
            consumed = start + width;
        }
        out.map(Option::unwrap_or_default)
    }
}

/// View a column's bytes as `len` values of `T`.
pub(crate) fn cast_column_mut<T: Component>(bytes: &mut [u8], len: usize) -> &mut [T] {
    if std::mem::size_of::<T>() == 0 {
        // SAFETY: any non-null aligned pointer is valid for zero-sized reads/writes.
        return unsafe { std::slice::from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), len) };
    }
    let column: &mut [T] = bytemuck::cast_slice_mut(bytes);
    debug_assert_eq!(column.len(), len);
    column
}

#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentRegistry, ComponentType};
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Big {
        data: [u64; 4],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Small {
        value: u16,
    }

    fn types(registry: &ComponentRegistry) -> Vec<ComponentType> {
        vec![registry.register::<Small>(), registry.register::<Big>()]
    }

    #[test]
    fn capacity_follows_stride() {
        let registry = ComponentRegistry::new();
        let big = registry.register::<Big>();

        let chunk = Chunk::new(&[big], DEFAULT_CHUNK_BYTES);
        assert_eq!(chunk.capacity(), 512);

        let tiny_budget = Chunk::new(&[big], 8);
        assert_eq!(tiny_budget.capacity(), 1);

        let empty = Chunk::new(&[], DEFAULT_CHUNK_BYTES);
        assert_eq!(empty.capacity(), DEFAULT_CHUNK_BYTES);
    }

    #[test]
    fn columns_are_aligned() {
        let registry = ComponentRegistry::new();
        let mut chunk = Chunk::new(&types(&registry), 1024);
        chunk.push(1);

        // Small (2 bytes) comes first; Big must still start on an 8-byte boundary.
        let big = chunk.column_mut::<Big>(1);
        assert_eq!(big.as_ptr() as usize % std::mem::align_of::<Big>(), 0);
    }

    #[test]
    fn push_zeroes_reused_rows() {
        let registry = ComponentRegistry::new();
        let mut chunk = Chunk::new(&types(&registry), 1024);
        let row = chunk.push(7);
        chunk.write_component(0, row, &Small { value: 99 });
        chunk.swap_remove(row);

        let row = chunk.push(8);
        assert_eq!(chunk.read_component::<Small>(0, row), Small { value: 0 });
    }

    #[test]
    fn swap_remove_moves_last_row() {
        let registry = ComponentRegistry::new();
        let mut chunk = Chunk::new(&types(&registry), 1024);
        for id in 1..=3u32 {
            let row = chunk.push(id);
            chunk.write_component(0, row, &Small { value: id as u16 * 10 });
            chunk.write_component(1, row, &Big { data: [id as u64; 4] });
        }

        assert_eq!(chunk.swap_remove(0), Some(3));
        assert_eq!(chunk.entities(), &[3, 2]);
        assert_eq!(chunk.read_component::<Small>(0, 0), Small { value: 30 });
        assert_eq!(chunk.read_component::<Big>(1, 0), Big { data: [3; 4] });

        assert_eq!(chunk.swap_remove(1), None);
        assert_eq!(chunk.entities(), &[3]);
    }

    #[test]
    fn columns_mut_returns_disjoint_views() {
        let registry = ComponentRegistry::new();
        let mut chunk = Chunk::new(&types(&registry), 1024);
        chunk.push(1);
        chunk.push(2);

        let len = chunk.len();
        let [big, small] = chunk.columns_mut([1, 0]);
        let big = cast_column_mut::<Big>(big, len);
        let small = cast_column_mut::<Small>(small, len);
        big[1].data[0] = 5;
        small[1].value = 6;

        assert_eq!(chunk.read_component::<Big>(1, 1).data[0], 5);
        assert_eq!(chunk.read_component::<Small>(0, 1).value, 6);
    }

    #[test]
    #[should_panic(expected = "borrowed twice")]
    fn columns_mut_rejects_aliasing() {
        let registry = ComponentRegistry::new();
        let mut chunk = Chunk::new(&types(&registry), 1024);
        chunk.push(1);
        let _ = chunk.columns_mut([1, 1]);
    }

    #[test]
    fn zero_sized_components_take_no_bytes() {
        let registry = ComponentRegistry::new();
        let tag = registry.register::<()>();
        let mut chunk = Chunk::new(&[tag], 64);
        assert_eq!(chunk.capacity(), 64);

        chunk.push(1);
        chunk.push(2);
        assert_eq!(chunk.column_mut::<()>(0).len(), 2);
        chunk.read_component::<()>(0, 1);
    }

    #[test]
    fn zero_sized_column_shares_offset_with_sized_one() {
        let registry = ComponentRegistry::new();
        let tag = registry.register::<()>();
        let small = registry.register::<Small>();
        let mut chunk = Chunk::new(&[tag, small], 64);
        chunk.push(1);
        chunk.push(2);

        for slots in [[0, 1], [1, 0]] {
            let [a, b] = chunk.columns_mut(slots);
            let widths = if slots[0] == 0 { (a.len(), b.len()) } else { (b.len(), a.len()) };
            assert_eq!(widths, (0, 4));
        }
    }
}
