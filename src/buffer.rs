//! Limited record buffer and chunk loading.

use std::cmp::Ordering;

use crate::stream::RecordReader;

/// Buffer limited by elements count.
///
/// Used both for chunks loaded from the input and for the merge output buffer.
#[derive(Debug)]
pub struct LimitedBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T> LimitedBuffer<T> {
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_slice(&self) -> &[T] {
        self.inner.as_slice()
    }

    /// Removes all elements keeping the allocated memory.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Sorts buffered elements in place using `compare`.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: Fn(&T, &T) -> Ordering,
    {
        self.inner.sort_by(|a, b| compare(a, b));
    }
}

impl<T> IntoIterator for LimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

/// Loads up to `limit` records from `reader`.
///
/// Returns the loaded chunk and whether the reader reached the end of stream before the limit.
/// A reader holding exactly `limit` records is not reported as exhausted.
/// On error the reader is left open; closing it is up to the caller.
pub fn load_chunk<T, R>(reader: &mut R, limit: usize) -> Result<(LimitedBuffer<T>, bool), R::Error>
where
    R: RecordReader<T>,
{
    let mut chunk = LimitedBuffer::new(limit);

    while !chunk.is_full() {
        match reader.read_next()? {
            Some(record) => chunk.push(record),
            None => return Ok((chunk, true)),
        }
    }

    return Ok((chunk, false));
}

#[cfg(test)]
pub(crate) mod test {
    use std::convert::Infallible;

    use rstest::*;

    use super::{load_chunk, LimitedBuffer};
    use crate::stream::RecordReader;

    /// In-memory reader over a vector of records.
    pub(crate) struct VecReader<T> {
        items: std::vec::IntoIter<T>,
        pub(crate) reads: usize,
    }

    impl<T> VecReader<T> {
        pub(crate) fn new(items: Vec<T>) -> Self {
            VecReader {
                items: items.into_iter(),
                reads: 0,
            }
        }
    }

    impl<T> RecordReader<T> for VecReader<T> {
        type Error = Infallible;

        fn open(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn read_next(&mut self) -> Result<Option<T>, Self::Error> {
            self.reads += 1;
            Ok(self.items.next())
        }

        fn close(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_limited_buffer() {
        let mut buffer = LimitedBuffer::with_capacity(2);

        buffer.push(1);
        assert_eq!(buffer.is_full(), false);
        buffer.push(0);
        assert_eq!(buffer.is_full(), true);

        buffer.sort_by(|a: &i32, b: &i32| a.cmp(b));
        assert_eq!(buffer.as_slice(), &[0, 1]);

        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![0, 1]);
    }

    #[rstest]
    #[case(vec![], 3, vec![], true)]
    #[case(vec![1, 2], 3, vec![1, 2], true)]
    #[case(vec![1, 2, 3], 3, vec![1, 2, 3], false)]
    #[case(vec![1, 2, 3, 4], 3, vec![1, 2, 3], false)]
    fn test_load_chunk(
        #[case] input: Vec<i32>,
        #[case] limit: usize,
        #[case] expected: Vec<i32>,
        #[case] expected_exhausted: bool,
    ) {
        let mut reader = VecReader::new(input);
        let (chunk, exhausted) = load_chunk(&mut reader, limit).unwrap();

        assert_eq!(chunk.as_slice(), expected.as_slice());
        assert_eq!(exhausted, expected_exhausted);
        assert!(reader.reads <= limit);
    }
}
